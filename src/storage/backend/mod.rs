//! SeaORM 存储后端
//!
//! 支持 SQLite、MySQL/MariaDB、PostgreSQL。所有持久化表（链接、事件、归因、佣金、预算、风控标记、人群包）
//! 都通过同一个 `SeaOrmStorage` 访问，各类操作按领域拆分到子模块。

mod commissions;
mod connection;
mod converters;
mod events;
mod fraud;
mod ledger;
mod links;
pub mod retry;
mod segments;
mod spend;

use sea_orm::DatabaseConnection;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::{EngineError, Result};

pub use commissions::CommissionDraft;
pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use ledger::{ClaimOutcome, OUTCOME_PENDING};
pub use segments::SegmentGenerationInfo;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(EngineError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    retry_config: retry::RetryConfig,
}

impl SeaOrmStorage {
    /// 建立连接并执行迁移
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let database_url = config.database_url.as_str();
        if database_url.is_empty() {
            return Err(EngineError::database_config("database_url 未设置"));
        }

        let backend_name = infer_backend_from_url(database_url)?;
        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, &backend_name, config.pool_size).await?
        };

        run_migrations(&db).await?;

        let storage = Self::from_connection(db, &backend_name, retry::RetryConfig::from(config));
        info!("{} storage initialized", backend_name.to_uppercase());
        Ok(storage)
    }

    /// 使用已有连接（测试或 CLI 复用）
    pub fn from_connection(
        db: DatabaseConnection,
        backend_name: &str,
        retry_config: retry::RetryConfig,
    ) -> Self {
        Self {
            db,
            backend_name: backend_name.to_string(),
            retry_config,
        }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// 健康检查用
    pub async fn ping(&self) -> Result<()> {
        self.db
            .ping()
            .await
            .map_err(|e| EngineError::store_unavailable(format!("ping failed: {}", e)))
    }
}
