use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, error, trace, warn};

use super::EntryLifetime;
use crate::cache::{CacheResult, CachedLink, ObjectCache};
use crate::errors::{EngineError, Result};
use crate::storage::ShortLink;

/// 多实例共享的 Redis 对象缓存
///
/// Redis 不可达时所有操作降级为 `Miss` / 空操作，由解析器回落到存储。
pub struct RedisObjectCache {
    client: redis::Client,
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    key_prefix: String,
    lifetime: EntryLifetime,
}

impl RedisObjectCache {
    /// 建立连接并 PING 一次
    pub async fn connect(url: &str, key_prefix: &str, lifetime: EntryLifetime) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| EngineError::cache_connection(format!("Invalid Redis URL: {e}")))?;

        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("Redis connection test successful: {}", pong);

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(Some(conn))),
            key_prefix: key_prefix.to_string(),
            lifetime,
        })
    }

    async fn get_connection(&self) -> std::result::Result<MultiplexedConnection, redis::RedisError> {
        {
            let guard = self.connection.read().await;
            if let Some(ref conn) = *guard {
                return Ok(conn.clone());
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(ref conn) = *guard {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        debug!("Redis connection re-established");
        Ok(conn)
    }

    async fn reset_connection(&self) {
        *self.connection.write().await = None;
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl ObjectCache for RedisObjectCache {
    async fn get(&self, key: &str) -> CacheResult {
        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis connection: {}", e);
                self.reset_connection().await;
                return CacheResult::Miss;
            }
        };

        let result: redis::RedisResult<Option<String>> = conn.get(self.make_key(key)).await;
        match result {
            Ok(Some(data)) => match serde_json::from_str::<CachedLink>(&data) {
                Ok(entry) if entry.is_fresh_at(Utc::now()) => CacheResult::Found(entry.link),
                Ok(entry) => CacheResult::Stale(entry.link),
                Err(e) => {
                    warn!("Discarding undecodable cache entry '{}': {}", key, e);
                    CacheResult::Miss
                }
            },
            Ok(None) => CacheResult::Miss,
            Err(e) => {
                error!("Failed to get key '{}': {}", key, e);
                self.reset_connection().await;
                CacheResult::Miss
            }
        }
    }

    async fn insert(&self, key: &str, value: ShortLink) {
        let ttl = self.lifetime.retention(&value).as_secs().max(1);
        let payload = match serde_json::to_string(&self.lifetime.wrap(value)) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize cache entry '{}': {}", key, e);
                return;
            }
        };

        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis connection: {}", e);
                self.reset_connection().await;
                return;
            }
        };

        match conn
            .set_ex::<String, String, ()>(self.make_key(key), payload, ttl)
            .await
        {
            Ok(()) => trace!("Cached '{}' in Redis for {}s", key, ttl),
            Err(e) => {
                error!("Failed to insert key '{}': {}", key, e);
                self.reset_connection().await;
            }
        }
    }

    async fn remove(&self, key: &str) {
        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis connection: {}", e);
                self.reset_connection().await;
                return;
            }
        };

        if let Err(e) = conn.del::<String, i32>(self.make_key(key)).await {
            error!("Failed to remove key '{}': {}", key, e);
            self.reset_connection().await;
        }
    }
}
