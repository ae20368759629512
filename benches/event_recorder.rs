//! EventRecorder 性能基准测试

use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::time::Duration;

use commerce_engine::events::{EventRecorder, EventSink};
use commerce_engine::storage::{ClickEvent, FraudState, ImpressionEvent};

/// 丢弃所有事件，只测缓冲开销
struct NoopSink;

#[async_trait::async_trait]
impl EventSink for NoopSink {
    async fn write_clicks(&self, _events: Vec<ClickEvent>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write_impressions(&self, _events: Vec<ImpressionEvent>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn create_recorder(max_buffered: usize) -> EventRecorder {
    EventRecorder::new(
        Arc::new(NoopSink) as Arc<dyn EventSink>,
        Duration::from_secs(3600), // 长间隔，避免定时刷盘
        max_buffered,
    )
}

fn click(i: usize) -> ClickEvent {
    ClickEvent {
        event_id: format!("evt-{}", i),
        short_code: "abc123".to_string(),
        campaign_id: "C1".to_string(),
        actor_id: format!("U{}", i % 512),
        device_id: None,
        ip_hash: None,
        earner_id: "E1".to_string(),
        fraud_state: FraudState::Clean,
        fraud_score: 0,
        clicked_at: Utc::now(),
    }
}

/// 单线程记录点击（不触发刷盘）
fn bench_record_click(c: &mut Criterion) {
    let recorder = create_recorder(usize::MAX);
    let mut i = 0;

    c.bench_function("record_click/single_thread", |b| {
        b.iter(|| {
            recorder.record_click(click(i));
            i += 1;
        });
    });
}

/// 多线程并发记录
fn bench_concurrent_record(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("record_click/concurrent");

    for num_tasks in [2, 4, 8] {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("tasks", num_tasks), &num_tasks, |b, &n| {
            let recorder = create_recorder(usize::MAX);
            b.iter(|| {
                rt.block_on(async {
                    let handles: Vec<_> = (0..n)
                        .map(|t| {
                            let recorder = recorder.clone();
                            tokio::spawn(async move {
                                for i in 0..1000 / n {
                                    recorder.record_click(click(t * 1000 + i));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap();
                    }
                });
            });
        });
    }
    group.finish();
}

/// 记录 + 手动刷盘
fn bench_record_and_flush(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let recorder = create_recorder(usize::MAX);

    let mut group = c.benchmark_group("flush");
    for batch in [100usize, 1000] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &batch| {
            b.iter(|| {
                for i in 0..batch {
                    recorder.record_click(click(i));
                }
                rt.block_on(recorder.flush());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_record_click,
    bench_concurrent_record,
    bench_record_and_flush
);
criterion_main!(benches);
