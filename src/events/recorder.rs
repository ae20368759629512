use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use tracing::{debug, trace, warn};

use crate::events::EventSink;
use crate::storage::{ClickEvent, ImpressionEvent};

/// 默认单类事件最多保留的条数（刷盘持续失败时）
pub const DEFAULT_MAX_RETAINED: usize = 100_000;

/// 单类事件的缓冲区
struct EventBuffer<T> {
    /// 序号 → 事件，序号保证刷盘时保持写入顺序
    data: DashMap<u64, T>,
    next_id: AtomicU64,
    /// 防止并发刷盘
    flush_lock: Mutex<()>,
    /// 阈值刷盘任务是否已排队
    flush_pending: AtomicBool,
    /// 超出保留上限被丢弃的条数
    dropped: AtomicU64,
}

impl<T> EventBuffer<T> {
    fn new() -> Self {
        Self {
            data: DashMap::new(),
            next_id: AtomicU64::new(0),
            flush_lock: Mutex::new(()),
            flush_pending: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: T, cap: usize) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.data.insert(id, event);
        self.evict_oldest(cap);
        self.data.len()
    }

    /// 超过上限时丢弃序号最小的事件，返回本次丢弃数
    fn evict_oldest(&self, cap: usize) -> usize {
        let len = self.data.len();
        if len <= cap {
            return 0;
        }
        let mut keys: Vec<u64> = self.data.iter().map(|r| *r.key()).collect();
        let excess = keys.len().saturating_sub(cap);
        if excess == 0 {
            return 0;
        }
        keys.select_nth_unstable(excess - 1);
        let removed = keys[..excess]
            .iter()
            .filter(|&&key| self.data.remove(&key).is_some())
            .count();
        self.dropped.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// 取出快照中的全部事件；窗口期内新写入的事件留在缓冲区
    fn drain(&self) -> Vec<(u64, T)> {
        let mut keys: Vec<u64> = self.data.iter().map(|r| *r.key()).collect();
        keys.sort_unstable();
        keys.into_iter()
            .filter_map(|key| self.data.remove(&key))
            .collect()
    }

    /// 刷盘失败时原样放回，超出上限的最旧事件被丢弃
    fn restore(&self, events: Vec<(u64, T)>, cap: usize) -> usize {
        for (key, event) in events {
            self.data.insert(key, event);
        }
        self.evict_oldest(cap)
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

async fn flush_buffer<T, F, Fut>(buffer: &EventBuffer<T>, label: &str, cap: usize, write: F)
where
    T: Clone,
    F: FnOnce(Vec<T>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let drained = buffer.drain();
    if drained.is_empty() {
        trace!("EventRecorder: no {} events to flush", label);
        return;
    }

    let count = drained.len();
    let events: Vec<T> = drained.iter().map(|(_, e)| e.clone()).collect();
    match write(events).await {
        Ok(()) => debug!("EventRecorder: flushed {} {} events", count, label),
        Err(e) => {
            let dropped = buffer.restore(drained, cap);
            warn!(
                "EventRecorder: {} flush failed: {}, {} events restored to buffer",
                label, e, count
            );
            if dropped > 0 {
                warn!(
                    "EventRecorder: {} buffer over {} events, dropped {} oldest",
                    label, cap, dropped
                );
            }
        }
    }
}

/// 事件记录器
///
/// `record_*` 不阻塞、不返回错误；落盘失败的事件留在内存中等待下一次刷盘。
/// 每类最多保留 `max_retained` 条，超出时丢弃最旧的并计入 `dropped()`。
#[derive(Clone)]
pub struct EventRecorder {
    clicks: Arc<EventBuffer<ClickEvent>>,
    impressions: Arc<EventBuffer<ImpressionEvent>>,
    sink: Arc<dyn EventSink>,
    flush_interval: Duration,
    max_buffered: usize,
    max_retained: usize,
}

impl EventRecorder {
    pub fn new(sink: Arc<dyn EventSink>, flush_interval: Duration, max_buffered: usize) -> Self {
        Self {
            clicks: Arc::new(EventBuffer::new()),
            impressions: Arc::new(EventBuffer::new()),
            sink,
            flush_interval,
            max_buffered: max_buffered.max(1),
            max_retained: DEFAULT_MAX_RETAINED.max(max_buffered),
        }
    }

    pub fn with_max_retained(mut self, max_retained: usize) -> Self {
        self.max_retained = max_retained.max(self.max_buffered);
        self
    }

    pub fn record_click(&self, event: ClickEvent) {
        let size = self.clicks.push(event, self.max_retained);
        if size >= self.max_buffered {
            self.spawn_flush(Arc::clone(&self.clicks), |sink, events| async move {
                sink.write_clicks(events).await
            });
        }
    }

    pub fn record_impression(&self, event: ImpressionEvent) {
        let size = self.impressions.push(event, self.max_retained);
        if size >= self.max_buffered {
            self.spawn_flush(Arc::clone(&self.impressions), |sink, events| async move {
                sink.write_impressions(events).await
            });
        }
    }

    /// 只有把 flush_pending 从 false 置为 true 的调用方才会 spawn，避免任务风暴
    fn spawn_flush<T, F, Fut>(&self, buffer: Arc<EventBuffer<T>>, write: F)
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Arc<dyn EventSink>, Vec<T>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if buffer
            .flush_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let sink = Arc::clone(&self.sink);
        let cap = self.max_retained;
        handle.spawn(async move {
            if let Ok(_guard) = buffer.flush_lock.try_lock() {
                flush_buffer(&buffer, "threshold", cap, |events| write(sink, events)).await;
            }
            buffer.flush_pending.store(false, Ordering::Release);
        });
    }

    /// 定时刷盘循环，由运行时在后台 spawn
    pub async fn start_background_task(&self) {
        loop {
            sleep(self.flush_interval).await;
            self.flush_available().await;
        }
    }

    /// 跳过正在刷盘的缓冲区
    async fn flush_available(&self) {
        if let Ok(_guard) = self.clicks.flush_lock.try_lock() {
            flush_buffer(&self.clicks, "click", self.max_retained, |events| {
                self.sink.write_clicks(events)
            })
            .await;
        }
        if let Ok(_guard) = self.impressions.flush_lock.try_lock() {
            flush_buffer(&self.impressions, "impression", self.max_retained, |events| {
                self.sink.write_impressions(events)
            })
            .await;
        }
    }

    /// 手动刷盘（关闭流程与测试使用），等待进行中的刷盘完成
    pub async fn flush(&self) {
        {
            let _guard = self.clicks.flush_lock.lock().await;
            flush_buffer(&self.clicks, "click", self.max_retained, |events| {
                self.sink.write_clicks(events)
            })
            .await;
        }
        {
            let _guard = self.impressions.flush_lock.lock().await;
            flush_buffer(&self.impressions, "impression", self.max_retained, |events| {
                self.sink.write_impressions(events)
            })
            .await;
        }
    }

    /// (点击, 曝光) 缓冲数量
    pub fn buffered(&self) -> (usize, usize) {
        (self.clicks.len(), self.impressions.len())
    }

    /// 因超出保留上限而丢弃的事件总数
    pub fn dropped(&self) -> u64 {
        self.clicks.dropped.load(Ordering::Relaxed)
            + self.impressions.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FraudState;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MockSink {
        clicks: std::sync::Mutex<Vec<ClickEvent>>,
        impressions: std::sync::Mutex<Vec<ImpressionEvent>>,
        fail_next: AtomicUsize,
    }

    #[async_trait]
    impl EventSink for MockSink {
        async fn write_clicks(&self, events: Vec<ClickEvent>) -> anyhow::Result<()> {
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("store down");
            }
            self.clicks.lock().unwrap().extend(events);
            Ok(())
        }

        async fn write_impressions(&self, events: Vec<ImpressionEvent>) -> anyhow::Result<()> {
            self.impressions.lock().unwrap().extend(events);
            Ok(())
        }
    }

    fn click(n: usize) -> ClickEvent {
        ClickEvent {
            event_id: format!("evt-{}", n),
            short_code: "abc123".into(),
            campaign_id: "C1".into(),
            actor_id: "A1".into(),
            device_id: None,
            ip_hash: None,
            earner_id: "E1".into(),
            fraud_state: FraudState::Clean,
            fraud_score: 0,
            clicked_at: Utc::now(),
        }
    }

    fn impression(n: usize) -> ImpressionEvent {
        ImpressionEvent {
            event_id: format!("imp-{}", n),
            creative_id: "cr-1".into(),
            campaign_id: "C1".into(),
            viewer_id: "V1".into(),
            thread_id: "T1".into(),
            earner_id: "P1".into(),
            score: 0.81,
            fraud_state: FraudState::Clean,
            fraud_score: 0,
            served_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_flush_preserves_order() {
        let sink = Arc::new(MockSink::default());
        let recorder = EventRecorder::new(sink.clone(), Duration::from_secs(60), 100);

        for n in 0..5 {
            recorder.record_click(click(n));
        }
        recorder.record_impression(impression(0));
        assert_eq!(recorder.buffered(), (5, 1));

        recorder.flush().await;

        assert_eq!(recorder.buffered(), (0, 0));
        let ids: Vec<String> = sink
            .clicks
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.event_id.clone())
            .collect();
        assert_eq!(ids, vec!["evt-0", "evt-1", "evt-2", "evt-3", "evt-4"]);
        assert_eq!(sink.impressions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_restores_events() {
        let sink = Arc::new(MockSink::default());
        sink.fail_next.store(1, Ordering::SeqCst);
        let recorder = EventRecorder::new(sink.clone(), Duration::from_secs(60), 100);

        recorder.record_click(click(0));
        recorder.record_click(click(1));
        recorder.flush().await;
        assert_eq!(recorder.buffered().0, 2);

        recorder.flush().await;
        assert_eq!(recorder.buffered().0, 0);
        assert_eq!(sink.clicks.lock().unwrap().len(), 2);
    }

    struct DownSink;

    #[async_trait]
    impl EventSink for DownSink {
        async fn write_clicks(&self, _events: Vec<ClickEvent>) -> anyhow::Result<()> {
            anyhow::bail!("store down")
        }
        async fn write_impressions(&self, _events: Vec<ImpressionEvent>) -> anyhow::Result<()> {
            anyhow::bail!("store down")
        }
    }

    #[tokio::test]
    async fn test_failing_sink_keeps_newest_within_cap() {
        let recorder =
            EventRecorder::new(Arc::new(DownSink), Duration::from_secs(60), 4).with_max_retained(4);

        for n in 0..10 {
            recorder.record_click(click(n));
        }
        recorder.flush().await;
        recorder.record_click(click(10));
        recorder.flush().await;

        assert_eq!(recorder.buffered().0, 4);
        assert_eq!(recorder.dropped(), 7);
        let mut kept: Vec<String> = recorder
            .clicks
            .data
            .iter()
            .map(|r| r.value().event_id.clone())
            .collect();
        kept.sort();
        assert_eq!(kept, vec!["evt-10", "evt-7", "evt-8", "evt-9"]);
    }

    #[tokio::test]
    async fn test_threshold_triggers_flush() {
        let sink = Arc::new(MockSink::default());
        let recorder = EventRecorder::new(sink.clone(), Duration::from_secs(60), 3);

        for n in 0..3 {
            recorder.record_click(click(n));
        }

        for _ in 0..50 {
            if sink.clicks.lock().unwrap().len() == 3 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.clicks.lock().unwrap().len(), 3);
    }
}
