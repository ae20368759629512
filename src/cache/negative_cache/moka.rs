use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::trace;

use crate::cache::NegativeCache;

/// 已确认不存在的短码，TTL 到期后重新查询存储
pub struct MokaNegativeCache {
    inner: Cache<String, ()>,
}

impl MokaNegativeCache {
    pub fn new(max_capacity: u64, ttl_secs: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { inner }
    }
}

#[async_trait]
impl NegativeCache for MokaNegativeCache {
    async fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    async fn mark(&self, key: &str) {
        trace!("Marking short code as not found: {}", key);
        self.inner.insert(key.to_string(), ()).await;
    }

    async fn remove(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_and_remove() {
        let cache = MokaNegativeCache::new(100, 60);
        assert!(!cache.contains("ghost").await);

        cache.mark("ghost").await;
        assert!(cache.contains("ghost").await);
        assert!(!cache.contains("other").await);

        cache.remove("ghost").await;
        assert!(!cache.contains("ghost").await);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MokaNegativeCache::new(100, 1);
        cache.mark("ghost").await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        cache.inner.run_pending_tasks().await;
        assert!(!cache.contains("ghost").await);
    }
}
