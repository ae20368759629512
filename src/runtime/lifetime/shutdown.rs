use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::services::Engine;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 单个任务超时时间（秒）
const TASK_TIMEOUT_SECS: u64 = 10;

pub async fn listen_for_shutdown(engine: Arc<Engine>) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, flushing data...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }

    match timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        perform_shutdown_tasks(&engine),
    )
    .await
    {
        Ok(()) => info!("All shutdown tasks completed successfully"),
        Err(_) => error!(
            "Shutdown tasks timed out after {} seconds",
            SHUTDOWN_TIMEOUT_SECS
        ),
    }
}

/// 执行所有关闭任务（在超时内调用）
pub async fn perform_shutdown_tasks(engine: &Engine) {
    let (clicks, impressions) = engine.recorder.buffered();
    match timeout(
        Duration::from_secs(TASK_TIMEOUT_SECS),
        engine.recorder.flush(),
    )
    .await
    {
        Ok(()) => info!(
            "Event buffers flushed ({} clicks, {} impressions)",
            clicks, impressions
        ),
        Err(_) => error!(
            "Event flush timed out after {} seconds",
            TASK_TIMEOUT_SECS
        ),
    }

    let (clicks, impressions) = engine.recorder.buffered();
    if clicks + impressions > 0 {
        warn!(
            "{} clicks and {} impressions could not be persisted before exit",
            clicks, impressions
        );
    }
}
