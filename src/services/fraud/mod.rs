//! FraudGuard：按 actor 维护风险分数与状态
//!
//! 同步、纯内存的判定，供解析、广告选择和归因在热路径上调用。
//! 状态只会自动变差（clean → suspect → blocked），恢复必须显式 `reset`。
//! 标记异步写入 `FlagStore`，启动时重新加载。

mod reasons;

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::FraudConfig;
use crate::errors::Result;
use crate::storage::{EventKind, FraudFlag, FraudState, ReasonCode};

pub use reasons::{ReasonWeights, state_for_score};

/// 风控标记的持久化
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn save_flag(&self, flag: &FraudFlag) -> Result<()>;
    async fn load_flags(&self) -> Result<Vec<FraudFlag>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub score: u32,
    pub state: FraudState,
}

impl Assessment {
    /// 事件能否参与归因
    pub fn is_countable(&self) -> bool {
        self.state != FraudState::Blocked
    }
}

/// 一次点击 / 曝光携带的信号
#[derive(Debug, Clone, Copy)]
pub struct Signal<'a> {
    pub campaign_id: &'a str,
    /// 设备指纹；仅当 actor 是显式账号时才有意义
    pub device_id: Option<&'a str>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    clicks: u64,
    conversions: u64,
}

type VelocityWindow = Arc<Mutex<VecDeque<Instant>>>;

pub struct FraudGuard {
    config: FraudConfig,
    weights: ReasonWeights,
    flags: DashMap<String, FraudFlag>,
    /// (actor, campaign) → 窗口内的事件时间
    velocity: moka::sync::Cache<(String, String), VelocityWindow>,
    /// 设备指纹 → 出现过的账号
    device_accounts: DashMap<String, HashSet<String>>,
    counters: DashMap<String, Counters>,
    persist_tx: Option<mpsc::UnboundedSender<FraudFlag>>,
}

impl FraudGuard {
    /// 不落盘的实例（测试、CLI）
    pub fn new(config: FraudConfig) -> Self {
        let window = Duration::from_secs(config.velocity_window_secs.max(1));
        Self {
            weights: ReasonWeights::from_config(&config),
            velocity: moka::sync::Cache::builder()
                .max_capacity(1_000_000)
                .time_to_idle(window)
                .support_invalidation_closures()
                .build(),
            flags: DashMap::new(),
            device_accounts: DashMap::new(),
            counters: DashMap::new(),
            persist_tx: None,
            config,
        }
    }

    /// 带持久化：标记变化后由后台任务写入 `store`。需要在 tokio 运行时内调用。
    pub fn with_store(config: FraudConfig, store: Arc<dyn FlagStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<FraudFlag>();
        tokio::spawn(async move {
            while let Some(flag) = rx.recv().await {
                if let Err(e) = store.save_flag(&flag).await {
                    warn!("Failed to persist fraud flag for {}: {}", flag.actor_id, e);
                }
            }
            debug!("Fraud flag writer stopped");
        });

        let mut guard = Self::new(config);
        guard.persist_tx = Some(tx);
        guard
    }

    /// 从存储加载已有标记（重启后封禁依然有效）
    pub async fn load(&self, store: &dyn FlagStore) -> Result<usize> {
        let flags = store.load_flags().await?;
        let count = flags.len();
        for flag in flags {
            self.flags.insert(flag.actor_id.clone(), flag);
        }
        info!("Loaded {} fraud flags", count);
        Ok(count)
    }

    /// 对一次点击 / 曝光做评估，同时更新速度窗口与计数
    pub fn assess(&self, actor_id: &str, kind: EventKind, signal: Signal<'_>) -> Assessment {
        let mut found = BTreeSet::new();

        let in_window = self.touch_velocity(actor_id, signal.campaign_id);
        if in_window > self.config.velocity_soft_limit {
            found.insert(ReasonCode::VelocityElevated);
        }
        if in_window > self.config.velocity_hard_limit {
            found.insert(ReasonCode::VelocityExcessive);
        }

        if kind == EventKind::Click {
            let counters = self.bump(actor_id, |c| c.clicks += 1);
            if Self::ratio_anomalous(&self.config, counters) {
                found.insert(ReasonCode::ConversionRatioAnomaly);
            }
        }

        if let Some(device) = signal.device_id
            && device != actor_id
        {
            let accounts = {
                let mut entry = self.device_accounts.entry(device.to_string()).or_default();
                entry.insert(actor_id.to_string());
                entry.len()
            };
            if accounts > self.config.shared_device_accounts {
                self.flag_device_accounts(device);
            }
        }

        self.apply(actor_id, found)
    }

    /// 记录一次转化（点击/转化比例启发式）
    pub fn record_conversion(&self, buyer_id: &str) -> Assessment {
        let counters = self.bump(buyer_id, |c| c.conversions += 1);
        let mut found = BTreeSet::new();
        if Self::ratio_anomalous(&self.config, counters) {
            found.insert(ReasonCode::ConversionRatioAnomaly);
        }
        self.apply(buyer_id, found)
    }

    /// 直接附加原因码（例如归因阶段发现的自我推荐）
    pub fn flag(&self, actor_id: &str, reason: ReasonCode) -> Assessment {
        self.apply(actor_id, BTreeSet::from([reason]))
    }

    /// 当前状态，不产生副作用
    pub fn current(&self, actor_id: &str) -> Assessment {
        self.flags
            .get(actor_id)
            .map(|f| Assessment {
                score: f.score,
                state: f.state,
            })
            .unwrap_or(Assessment {
                score: 0,
                state: FraudState::Clean,
            })
    }

    pub fn get(&self, actor_id: &str) -> Option<FraudFlag> {
        self.flags.get(actor_id).map(|f| f.clone())
    }

    /// 按 actor id 排序；`state` 为空时返回全部非 clean 标记
    pub fn list(&self, state: Option<FraudState>) -> Vec<FraudFlag> {
        let mut flags: Vec<FraudFlag> = self
            .flags
            .iter()
            .filter(|f| match state {
                Some(s) => f.state == s,
                None => f.state != FraudState::Clean,
            })
            .map(|f| f.clone())
            .collect();
        flags.sort_by(|a, b| a.actor_id.cmp(&b.actor_id));
        flags
    }

    /// 人工复核后恢复为 clean，清空该 actor 的全部累计信号
    pub fn reset(&self, actor_id: &str) -> FraudFlag {
        let flag = FraudFlag::clean(actor_id);
        self.flags.insert(actor_id.to_string(), flag.clone());
        self.counters.remove(actor_id);
        self.velocity
            .invalidate_entries_if({
                let actor = actor_id.to_string();
                move |(a, _), _| *a == actor
            })
            .ok();
        for mut accounts in self.device_accounts.iter_mut() {
            accounts.remove(actor_id);
        }
        info!("Fraud flag reset for {}", actor_id);
        self.persist(flag.clone());
        flag
    }

    fn touch_velocity(&self, actor_id: &str, campaign_id: &str) -> usize {
        let window = Duration::from_secs(self.config.velocity_window_secs);
        let key = (actor_id.to_string(), campaign_id.to_string());
        let events = self
            .velocity
            .get_with(key, || Arc::new(Mutex::new(VecDeque::new())));

        let now = Instant::now();
        let mut events = events.lock();
        while events
            .front()
            .is_some_and(|t| now.duration_since(*t) > window)
        {
            events.pop_front();
        }
        events.push_back(now);
        events.len()
    }

    fn bump(&self, actor_id: &str, f: impl FnOnce(&mut Counters)) -> Counters {
        let mut entry = self.counters.entry(actor_id.to_string()).or_default();
        f(&mut entry);
        *entry
    }

    fn ratio_anomalous(config: &FraudConfig, c: Counters) -> bool {
        c.conversions > c.clicks || (c.clicks >= config.ratio_min_clicks && c.conversions == 0)
    }

    fn flag_device_accounts(&self, device: &str) {
        let accounts: Vec<String> = self
            .device_accounts
            .get(device)
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default();
        for account in accounts {
            self.apply(&account, BTreeSet::from([ReasonCode::SharedDevice]));
        }
    }

    /// 合并原因码并单调提升状态；有变化时异步落盘
    fn apply(&self, actor_id: &str, found: BTreeSet<ReasonCode>) -> Assessment {
        let mut entry = self
            .flags
            .entry(actor_id.to_string())
            .or_insert_with(|| FraudFlag::clean(actor_id));

        let before = (entry.reason_codes.len(), entry.state);
        entry.reason_codes.extend(found);
        entry.score = self.weights.score(&entry.reason_codes);
        let computed = state_for_score(
            entry.score,
            self.config.suspect_threshold,
            self.config.block_threshold,
        );
        entry.state = entry.state.max(computed);

        let assessment = Assessment {
            score: entry.score,
            state: entry.state,
        };

        if (entry.reason_codes.len(), entry.state) != before {
            entry.updated_at = Utc::now();
            let snapshot = entry.clone();
            drop(entry);
            debug!(
                "Fraud flag for {} now {} (score {})",
                actor_id, assessment.state, assessment.score
            );
            self.persist(snapshot);
        }
        assessment
    }

    fn persist(&self, flag: FraudFlag) {
        if let Some(tx) = &self.persist_tx
            && tx.send(flag).is_err()
        {
            warn!("Fraud flag writer is gone, flag not persisted");
        }
    }
}
