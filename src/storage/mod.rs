use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::errors::Result;

pub mod backend;
pub mod models;

pub use backend::SeaOrmStorage;
pub use models::{
    Attribution, ClickEvent, Commission, CommissionKind, CommissionStatus, Conversion, EventKind,
    FraudFlag, FraudState, ImpressionEvent, ReasonCode, SegmentDefinition, ShortLink, Touch,
};

/// 短链接的持久化存储（解析的最终数据源）
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn get(&self, code: &str) -> Result<Option<ShortLink>>;

    /// 短码已存在时返回 `DuplicateKey`
    async fn create(&self, link: &ShortLink) -> Result<()>;

    /// 停用链接；返回链接是否存在
    async fn deactivate(&self, code: &str) -> Result<bool>;

    /// 只加载短码，用于存在性过滤器预热
    async fn load_all_codes(&self) -> Result<Vec<String>>;
}

pub struct StorageFactory;

impl StorageFactory {
    pub async fn create(config: &DatabaseConfig) -> Result<Arc<SeaOrmStorage>> {
        let storage = SeaOrmStorage::connect(config).await?;
        Ok(Arc::new(storage))
    }
}
