//! 数据库写操作重试
//!
//! 仅用于后台写入（事件刷盘、风控标记落盘、人群包重建）。热路径读取不重试，由调用方的延迟预算兜底。

use std::future::Future;
use std::time::Duration;

use sea_orm::DbErr;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 判断数据库错误是否值得重试
pub fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime_err) | DbErr::Query(runtime_err) => is_transient(runtime_err),
        _ => false,
    }
}

fn is_transient(err: &sea_orm::error::RuntimeErr) -> bool {
    use sea_orm::error::RuntimeErr;

    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            if let Some(code) = sqlx_err
                .deref()
                .as_database_error()
                .and_then(|db_err| db_err.code())
            {
                // MySQL 死锁/锁等待，PostgreSQL 序列化失败/死锁，SQLite BUSY/LOCKED
                return matches!(
                    code.as_ref(),
                    "1213" | "1205" | "40001" | "40P01" | "5" | "6"
                );
            }
            is_transient_message(&sqlx_err.to_string().to_lowercase())
        }
        RuntimeErr::Internal(msg) => is_transient_message(&msg.to_lowercase()),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn is_transient_message(msg: &str) -> bool {
    msg.contains("deadlock")
        || msg.contains("lock wait timeout")
        || msg.contains("database is locked")
        || msg.contains("serialization failure")
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 20,
            max_delay_ms: 500,
        }
    }
}

impl From<&crate::config::DatabaseConfig> for RetryConfig {
    fn from(config: &crate::config::DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

/// 指数退避 + 抖动重试，不可重试的错误立即返回
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("'{}' succeeded after {} retries", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if is_retryable_error(&e) && attempt < config.max_retries => {
                attempt += 1;
                let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
                warn!(
                    "'{}' failed (attempt {}/{}): {}; retrying in {} ms",
                    operation_name,
                    attempt,
                    config.max_retries + 1,
                    e,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// attempt 从 1 开始；在上限基础上加 0-25% 抖动
fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    use rand::RngExt;
    let capped = base_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(max_ms);
    let jitter = rand::rng().random_range(0..=capped / 4);
    capped.saturating_add(jitter)
}
