mod moka;
mod redis;

pub use self::moka::MokaObjectCache;
pub use self::redis::RedisObjectCache;

use std::time::Duration;

use chrono::Utc;

use crate::cache::CachedLink;
use crate::storage::ShortLink;

/// 条目的新鲜期与总保留期（新鲜期 + 宽限期），都不会超过链接本身的过期时间
#[derive(Debug, Clone, Copy)]
pub struct EntryLifetime {
    pub fresh: Duration,
    pub grace: Duration,
}

impl EntryLifetime {
    pub fn new(fresh_secs: u64, grace_secs: u64) -> Self {
        Self {
            fresh: Duration::from_secs(fresh_secs),
            grace: Duration::from_secs(grace_secs),
        }
    }

    pub fn wrap(&self, link: ShortLink) -> CachedLink {
        let fresh = chrono::Duration::from_std(self.fresh).unwrap_or(chrono::Duration::zero());
        CachedLink {
            link,
            fresh_until: Utc::now() + fresh,
        }
    }

    /// 条目在缓存中的总存活时间
    pub fn retention(&self, link: &ShortLink) -> Duration {
        let total = self.fresh + self.grace;
        match link.expires_at {
            Some(expires_at) => {
                let remaining = (expires_at - Utc::now()).num_milliseconds();
                if remaining <= 0 {
                    Duration::from_secs(1)
                } else {
                    total.min(Duration::from_millis(remaining as u64))
                }
            }
            None => total,
        }
    }
}
