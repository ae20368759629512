//! 频次上限与会话内广告比例
//!
//! 两者都放在进程内 moka 缓存里，按空闲时间自然淘汰。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use parking_lot::Mutex;

type Impressions = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

/// (viewer, campaign) → 周期内的展示时间
pub struct FrequencyTracker {
    history: Cache<(String, String), Impressions>,
    period: chrono::Duration,
    cap: u32,
}

impl FrequencyTracker {
    pub fn new(capacity: u64, period_secs: u64, cap: u32) -> Self {
        Self {
            history: Cache::builder()
                .max_capacity(capacity)
                .time_to_idle(Duration::from_secs(period_secs.max(1)))
                .build(),
            period: chrono::Duration::seconds(period_secs as i64),
            cap,
        }
    }

    fn entry(&self, viewer_id: &str, campaign_id: &str) -> Impressions {
        self.history
            .get_with((viewer_id.to_string(), campaign_id.to_string()), || {
                Arc::new(Mutex::new(VecDeque::new()))
            })
    }

    fn prune(&self, window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while let Some(front) = window.front() {
            if now - *front >= self.period {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// 周期内各次展示距今的秒数
    pub fn recent_ages(&self, viewer_id: &str, campaign_id: &str, now: DateTime<Utc>) -> Vec<f64> {
        let key = (viewer_id.to_string(), campaign_id.to_string());
        let Some(entry) = self.history.get(&key) else {
            return Vec::new();
        };
        let mut window = entry.lock();
        self.prune(&mut window, now);
        window
            .iter()
            .map(|at| (now - *at).num_milliseconds().max(0) as f64 / 1000.0)
            .collect()
    }

    pub fn is_capped(&self, viewer_id: &str, campaign_id: &str, now: DateTime<Utc>) -> bool {
        self.recent_ages(viewer_id, campaign_id, now).len() >= self.cap as usize
    }

    /// 在上限内占一个名额；已满时返回 false
    pub fn try_reserve(&self, viewer_id: &str, campaign_id: &str, now: DateTime<Utc>) -> bool {
        let entry = self.entry(viewer_id, campaign_id);
        let mut window = entry.lock();
        self.prune(&mut window, now);
        if window.len() >= self.cap as usize {
            return false;
        }
        window.push_back(now);
        true
    }

    /// 撤销 `try_reserve` 占用的名额（扣预算失败时）
    pub fn release(&self, viewer_id: &str, campaign_id: &str, at: DateTime<Utc>) {
        let key = (viewer_id.to_string(), campaign_id.to_string());
        if let Some(entry) = self.history.get(&key) {
            let mut window = entry.lock();
            if let Some(pos) = window.iter().rposition(|t| *t == at) {
                window.remove(pos);
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounters {
    pub contexts: u64,
    pub fills: u64,
}

/// (viewer, session) → 已见上下文数与已填充数
pub struct SessionTracker {
    sessions: Cache<(String, String), Arc<Mutex<SessionCounters>>>,
    max_ratio: f64,
}

impl SessionTracker {
    pub fn new(capacity: u64, ttl_secs: u64, max_ratio: f64) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(capacity)
                .time_to_idle(Duration::from_secs(ttl_secs.max(1)))
                .build(),
            max_ratio,
        }
    }

    fn entry(&self, viewer_id: &str, session_id: &str) -> Arc<Mutex<SessionCounters>> {
        self.sessions
            .get_with((viewer_id.to_string(), session_id.to_string()), || {
                Arc::new(Mutex::new(SessionCounters::default()))
            })
    }

    /// 先计入当前上下文，再判断是否还允许填充
    pub fn observe_context(&self, viewer_id: &str, session_id: &str) -> bool {
        let entry = self.entry(viewer_id, session_id);
        let mut counters = entry.lock();
        counters.contexts += 1;
        let allowed = (self.max_ratio * counters.contexts as f64).ceil() as u64;
        counters.fills < allowed
    }

    pub fn record_fill(&self, viewer_id: &str, session_id: &str) {
        let entry = self.entry(viewer_id, session_id);
        entry.lock().fills += 1;
    }

    pub fn counters(&self, viewer_id: &str, session_id: &str) -> SessionCounters {
        let key = (viewer_id.to_string(), session_id.to_string());
        self.sessions
            .get(&key)
            .map(|entry| *entry.lock())
            .unwrap_or_default()
    }
}
