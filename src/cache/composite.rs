use std::sync::Arc;

use tracing::{info, trace, warn};

use crate::cache::existence_filter::BloomExistenceFilter;
use crate::cache::negative_cache::MokaNegativeCache;
use crate::cache::object_cache::{EntryLifetime, MokaObjectCache, RedisObjectCache};
use crate::cache::{CacheResult, ExistenceFilter, NegativeCache, ObjectCache};
use crate::config::CacheConfig;
use crate::errors::{EngineError, Result};
use crate::storage::ShortLink;

/// 三层链接缓存：存在性过滤 → 负缓存 → 对象缓存
///
/// 过滤器只知道本进程见过的短码。默认情况下“不存在”只作为提示，仍交给存储确认，
/// 反复查询的未知短码由负缓存吸收；`authoritative_filter` 打开时才直接判定不存在。
pub struct CompositeCache {
    filter: Arc<dyn ExistenceFilter>,
    negative: Arc<dyn NegativeCache>,
    objects: Arc<dyn ObjectCache>,
    fp_rate: f64,
    authoritative_filter: bool,
}

impl CompositeCache {
    pub fn new(
        filter: Arc<dyn ExistenceFilter>,
        negative: Arc<dyn NegativeCache>,
        objects: Arc<dyn ObjectCache>,
        fp_rate: f64,
    ) -> Self {
        Self {
            filter,
            negative,
            objects,
            fp_rate,
            authoritative_filter: false,
        }
    }

    pub fn with_authoritative_filter(mut self, authoritative: bool) -> Self {
        self.authoritative_filter = authoritative;
        self
    }

    /// 按 `cache.type` 组装；Redis 连接失败时退回进程内缓存
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let lifetime = EntryLifetime::new(config.link_ttl_secs, config.stale_grace_secs);
        let objects: Arc<dyn ObjectCache> = match config.cache_type.as_str() {
            "memory" => Arc::new(MokaObjectCache::new(config.max_capacity, lifetime)),
            "redis" => {
                match RedisObjectCache::connect(
                    &config.redis.url,
                    &config.redis.key_prefix,
                    lifetime,
                )
                .await
                {
                    Ok(cache) => Arc::new(cache),
                    Err(e) => {
                        warn!("Redis cache unavailable ({}), using in-process cache", e);
                        Arc::new(MokaObjectCache::new(config.max_capacity, lifetime))
                    }
                }
            }
            other => {
                return Err(EngineError::config(format!(
                    "unknown cache.type '{}', expected memory or redis",
                    other
                )));
            }
        };

        Ok(Self::new(
            Arc::new(BloomExistenceFilter::new(config.bloom_fp_rate)?),
            Arc::new(MokaNegativeCache::new(
                config.max_capacity,
                config.negative_ttl_secs,
            )),
            objects,
            config.bloom_fp_rate,
        )
        .with_authoritative_filter(config.authoritative_filter))
    }

    pub async fn get(&self, code: &str) -> CacheResult {
        if !self.filter.check(code).await {
            if self.authoritative_filter {
                return CacheResult::NotFound;
            }
            trace!("'{}' unknown to the existence filter, deferring to store", code);
        }
        if self.negative.contains(code).await {
            return CacheResult::NotFound;
        }
        self.objects.get(code).await
    }

    pub async fn insert(&self, link: ShortLink) {
        let code = link.code.clone();
        self.filter.set(&code).await;
        self.negative.remove(&code).await;
        self.objects.insert(&code, link).await;
    }

    /// 存储确认不存在
    pub async fn mark_not_found(&self, code: &str) {
        self.negative.mark(code).await;
        self.objects.remove(code).await;
    }

    /// 链接状态变化（停用）后让下一次解析回源
    pub async fn invalidate(&self, code: &str) {
        self.objects.remove(code).await;
    }

    /// 新建的链接可能正处在负缓存里
    pub async fn register_code(&self, code: &str) {
        self.filter.set(code).await;
        self.negative.remove(code).await;
    }

    /// 预热第一步：在读取存储快照之前开始缓冲新注册的短码
    pub async fn begin_warm_up(&self) {
        self.filter.begin_rebuild().await;
    }

    /// 用存储里的全部短码重建存在性过滤器
    pub async fn finish_warm_up(&self, codes: &[String]) -> Result<()> {
        self.filter.rebuild(codes, self.fp_rate).await?;
        info!("Existence filter warmed with {} codes", codes.len());
        Ok(())
    }

    pub async fn abort_warm_up(&self) {
        self.filter.abort_rebuild().await;
    }

    /// 一次性预热（快照已在手）
    pub async fn warm_up(&self, codes: &[String]) -> Result<()> {
        self.begin_warm_up().await;
        self.finish_warm_up(codes).await
    }
}
