use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::errors::{EngineError, Result};
use migration::{Migrator, MigratorTrait};

/// 连接 SQLite（WAL 模式，自动建库）
pub async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
    use sea_orm::SqlxSqliteConnector;
    use sea_orm::sqlx::SqlitePool;
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
    use std::str::FromStr;

    let opt = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| EngineError::database_config(format!("SQLite URL 解析失败: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .pragma("cache_size", "-64000")
        .pragma("temp_store", "memory");

    let pool = SqlitePool::connect_with(opt).await.map_err(|e| {
        EngineError::store_unavailable(format!("无法连接到 SQLite 数据库: {}", e))
    })?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// 连接 MySQL / PostgreSQL
pub async fn connect_generic(
    database_url: &str,
    backend_name: &str,
    pool_size: u32,
) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(pool_size)
        .min_connections(pool_size.min(5))
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(2))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(3600))
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        EngineError::store_unavailable(format!(
            "无法连接到 {} 数据库: {}",
            backend_name.to_uppercase(),
            e
        ))
    })
}

pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| EngineError::database_operation(format!("迁移失败: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
