//! 健康检查：存储连通性 + 缓存与事件缓冲状态
//!
//! 直接访问存储，不经过业务服务；探针需要快速返回。

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, trace};

use crate::services::Engine;

const STORE_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
pub struct StorageCheck {
    pub status: &'static str,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCheck {
    pub buffered_clicks: usize,
    pub buffered_impressions: usize,
    /// 存储不可用期间超出保留上限被丢弃的事件数
    pub dropped_events: u64,
    pub segment_generation: i64,
    pub catalog_campaigns: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: u64,
    pub storage: StorageCheck,
    pub pipeline: PipelineCheck,
    pub response_time_ms: u64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.storage.status == "healthy"
    }
}

pub async fn check(engine: &Engine) -> HealthReport {
    let started = Instant::now();
    trace!("Running health check");

    let backend = engine.storage.backend_name().to_string();
    let storage = match tokio::time::timeout(STORE_PING_TIMEOUT, engine.storage.ping()).await {
        Ok(Ok(())) => StorageCheck {
            status: "healthy",
            backend,
            error: None,
        },
        Ok(Err(e)) => {
            error!("Storage health check failed: {}", e);
            StorageCheck {
                status: "unhealthy",
                backend,
                error: Some(e.to_string()),
            }
        }
        Err(_) => {
            error!("Storage health check timed out");
            StorageCheck {
                status: "unhealthy",
                backend,
                error: Some("timeout".to_string()),
            }
        }
    };

    let (buffered_clicks, buffered_impressions) = engine.recorder.buffered();
    let now = Utc::now();
    let healthy = storage.status == "healthy";

    HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: now.to_rfc3339(),
        uptime: (now - engine.started_at).num_seconds().max(0) as u64,
        storage,
        pipeline: PipelineCheck {
            buffered_clicks,
            buffered_impressions,
            dropped_events: engine.recorder.dropped(),
            segment_generation: engine.segments.generation(),
            catalog_campaigns: engine.catalog.snapshot().campaigns.len(),
        },
        response_time_ms: started.elapsed().as_millis() as u64,
    }
}
