use async_trait::async_trait;
use bloomfilter::Bloom;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::cache::ExistenceFilter;
use crate::errors::{EngineError, Result};

/// 基于 Bloom Filter 的短码存在性过滤
pub struct BloomExistenceFilter {
    inner: RwLock<Bloom<str>>,
    /// 重建期间并发 set() 的 key；Some 表示正在重建
    rebuild_buffer: Mutex<Option<Vec<String>>>,
}

impl BloomExistenceFilter {
    pub fn new(fp_rate: f64) -> Result<Self> {
        // 启动预热会按实际数量重建，这里只需最小容量
        let bloom = Bloom::new_for_fp_rate(1000, fp_rate).map_err(|e| {
            EngineError::cache_connection(format!("Failed to create bloom filter: {e}"))
        })?;
        Ok(Self {
            inner: RwLock::new(bloom),
            rebuild_buffer: Mutex::new(None),
        })
    }
}

/// 预留容量：小规模多留，大规模少留
fn calculate_capacity(count: usize) -> usize {
    let reserve = if count < 5000 {
        count / 2
    } else if count < 100_000 {
        count / 5
    } else {
        (count / 10).min(1_000_000)
    };
    count + reserve.max(1000)
}

#[async_trait]
impl ExistenceFilter for BloomExistenceFilter {
    async fn check(&self, key: &str) -> bool {
        self.inner.read().check(key)
    }

    async fn set(&self, key: &str) {
        // 锁顺序：buffer → inner，与 rebuild 一致
        let mut buffer = self.rebuild_buffer.lock();
        self.inner.write().set(key);
        if let Some(ref mut pending) = *buffer {
            pending.push(key.to_string());
        }
    }

    async fn begin_rebuild(&self) {
        let mut buffer = self.rebuild_buffer.lock();
        if buffer.is_none() {
            *buffer = Some(Vec::new());
        }
    }

    /// 锁外构建新过滤器后整体替换，读取方不会看到空过滤器
    async fn rebuild(&self, keys: &[String], fp_rate: f64) -> Result<()> {
        self.begin_rebuild().await;

        let capacity = calculate_capacity(keys.len());
        let mut fresh = match Bloom::new_for_fp_rate(capacity, fp_rate) {
            Ok(bloom) => bloom,
            Err(e) => {
                *self.rebuild_buffer.lock() = None;
                return Err(EngineError::cache_connection(format!(
                    "Failed to rebuild bloom filter: {e}"
                )));
            }
        };
        for key in keys {
            fresh.set(key.as_str());
        }

        let buffered = {
            let mut buffer = self.rebuild_buffer.lock();
            let pending = buffer.take().unwrap_or_default();
            for key in &pending {
                fresh.set(key.as_str());
            }
            *self.inner.write() = fresh;
            pending.len()
        };

        debug!(
            "Bloom filter rebuilt with {} keys ({} buffered), capacity {}",
            keys.len() + buffered,
            buffered,
            capacity
        );
        Ok(())
    }

    async fn abort_rebuild(&self) {
        *self.rebuild_buffer.lock() = None;
    }
}
