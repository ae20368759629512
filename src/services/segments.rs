//! 用户人群包查询
//!
//! 内存里只保留当前 active 代的快照，刷新时整体替换。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::storage::SeaOrmStorage;

#[derive(Debug, Clone, Default)]
pub struct SegmentSnapshot {
    pub generation: i64,
    pub computed_at: Option<DateTime<Utc>>,
    pub memberships: HashMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentLookup {
    pub segments: BTreeSet<String>,
    pub computed_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

pub struct SegmentStore {
    snapshot: ArcSwap<SegmentSnapshot>,
    staleness: chrono::Duration,
}

impl SegmentStore {
    pub fn new(staleness_secs: u64) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(SegmentSnapshot::default()),
            staleness: chrono::Duration::seconds(staleness_secs as i64),
        }
    }

    pub fn install(&self, snapshot: SegmentSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn generation(&self) -> i64 {
        self.snapshot.load().generation
    }

    /// 未知用户返回空集合；快照过旧时仍然返回，只是标记 stale
    pub fn lookup(&self, user_id: &str) -> SegmentLookup {
        let snapshot = self.snapshot.load();
        let stale = match snapshot.computed_at {
            Some(at) => Utc::now() - at > self.staleness,
            None => true,
        };
        SegmentLookup {
            segments: snapshot
                .memberships
                .get(user_id)
                .cloned()
                .unwrap_or_default(),
            computed_at: snapshot.computed_at,
            stale,
        }
    }

    /// 从存储加载 active 代；代号未变时不替换。返回是否发生了切换
    pub async fn refresh(&self, storage: &SeaOrmStorage) -> Result<bool> {
        let Some((info, memberships)) = storage.load_active_segments().await? else {
            debug!("No active segment generation yet");
            return Ok(false);
        };
        if info.generation == self.generation() {
            return Ok(false);
        }

        let users = memberships.len();
        self.install(SegmentSnapshot {
            generation: info.generation,
            computed_at: Some(info.computed_at),
            memberships,
        });
        info!(
            "Segment snapshot switched to generation {} ({} users)",
            info.generation, users
        );
        Ok(true)
    }

    pub async fn start_refresh_task(self: Arc<Self>, storage: Arc<SeaOrmStorage>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = self.refresh(&storage).await {
                warn!("Segment refresh failed, keeping generation {}: {}", self.generation(), e);
            }
        }
    }
}
