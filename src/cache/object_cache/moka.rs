use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use moka::policy::Expiry;
use tracing::debug;

use super::EntryLifetime;
use crate::cache::{CacheResult, CachedLink, ObjectCache};
use crate::storage::ShortLink;

/// 每个条目按链接自身的过期时间截断保留期
struct CachedLinkExpiry {
    lifetime: EntryLifetime,
}

impl Expiry<String, CachedLink> for CachedLinkExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedLink,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.lifetime.retention(&value.link))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedLink,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.lifetime.retention(&value.link))
    }
}

/// 进程内对象缓存
pub struct MokaObjectCache {
    inner: Cache<String, CachedLink>,
    lifetime: EntryLifetime,
}

impl MokaObjectCache {
    pub fn new(max_capacity: u64, lifetime: EntryLifetime) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(CachedLinkExpiry { lifetime })
            .build();
        debug!(
            "MokaObjectCache initialized: capacity={}, fresh={:?}, grace={:?}",
            max_capacity, lifetime.fresh, lifetime.grace
        );
        Self { inner, lifetime }
    }

    #[cfg(test)]
    pub(crate) async fn insert_entry(&self, key: &str, entry: CachedLink) {
        self.inner.insert(key.to_string(), entry).await;
    }
}

#[async_trait]
impl ObjectCache for MokaObjectCache {
    async fn get(&self, key: &str) -> CacheResult {
        match self.inner.get(key).await {
            Some(entry) if entry.is_fresh_at(Utc::now()) => CacheResult::Found(entry.link),
            Some(entry) => CacheResult::Stale(entry.link),
            None => CacheResult::Miss,
        }
    }

    async fn insert(&self, key: &str, value: ShortLink) {
        self.inner
            .insert(key.to_string(), self.lifetime.wrap(value))
            .await;
    }

    async fn remove(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(code: &str) -> ShortLink {
        ShortLink {
            code: code.to_string(),
            destination: "https://merchant.example/item/9".into(),
            campaign_id: "C1".into(),
            earner_id: "E1".into(),
            created_at: Utc::now(),
            expires_at: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_found() {
        let cache = MokaObjectCache::new(100, EntryLifetime::new(60, 600));
        let original = link("abc123");
        cache.insert("abc123", original.clone()).await;
        assert_eq!(cache.get("abc123").await, CacheResult::Found(original));
    }

    #[tokio::test]
    async fn test_past_fresh_window_is_stale() {
        let cache = MokaObjectCache::new(100, EntryLifetime::new(60, 600));
        let entry = CachedLink {
            link: link("abc123"),
            fresh_until: Utc::now() - chrono::Duration::seconds(1),
        };
        cache.insert_entry("abc123", entry).await;
        assert!(matches!(cache.get("abc123").await, CacheResult::Stale(_)));
    }

    #[tokio::test]
    async fn test_missing_and_removed() {
        let cache = MokaObjectCache::new(100, EntryLifetime::new(60, 600));
        assert_eq!(cache.get("nope").await, CacheResult::Miss);

        cache.insert("abc123", link("abc123")).await;
        cache.remove("abc123").await;
        assert_eq!(cache.get("abc123").await, CacheResult::Miss);
    }
}
