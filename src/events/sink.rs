use crate::storage::{ClickEvent, ImpressionEvent};

/// 事件落盘目标
///
/// 写入必须按 `event_id` 幂等：刷盘失败后整批会被重新提交。
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn write_clicks(&self, events: Vec<ClickEvent>) -> anyhow::Result<()>;

    async fn write_impressions(&self, events: Vec<ImpressionEvent>) -> anyhow::Result<()>;
}
