use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::storage::ShortLink;

/// 缓存查询结果
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult {
    /// 确定不存在（负缓存命中，或权威模式下过滤器判定不存在）
    NotFound,
    /// 可能存在，但没有可用的缓存值
    Miss,
    /// 新鲜的缓存值
    Found(ShortLink),
    /// 已过 TTL、仍在宽限期内的旧值，只在存储不可用时使用
    Stale(ShortLink),
}

/// 对象缓存中保存的条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLink {
    pub link: ShortLink,
    pub fresh_until: DateTime<Utc>,
}

impl CachedLink {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.fresh_until
    }
}

#[async_trait]
pub trait ExistenceFilter: Send + Sync {
    /// `false` 表示**一定不存在**，`true` 表示**可能存在**
    async fn check(&self, key: &str) -> bool;

    async fn set(&self, key: &str);

    /// 开始缓冲此后 set() 的 key，必须在读取存储快照之前调用
    async fn begin_rebuild(&self);

    /// 用完整的短码集合重建过滤器，并补入 `begin_rebuild` 之后缓冲的 key
    async fn rebuild(&self, keys: &[String], fp_rate: f64) -> Result<()>;

    /// 放弃重建（读取快照失败）
    async fn abort_rebuild(&self);
}

#[async_trait]
pub trait NegativeCache: Send + Sync {
    async fn contains(&self, key: &str) -> bool;
    async fn mark(&self, key: &str);
    async fn remove(&self, key: &str);
}

#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// 返回 `Found` / `Stale` / `Miss`
    async fn get(&self, key: &str) -> CacheResult;
    async fn insert(&self, key: &str, value: ShortLink);
    async fn remove(&self, key: &str);
}
