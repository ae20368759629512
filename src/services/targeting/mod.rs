//! AdTargetingEngine：请求时为广告位选择创意
//!
//! 流程：会话比例检查 → 读取人群包 → 过滤合格创意 → 打分排序 → 依次尝试扣预算。
//! 扣费输给并发请求时换下一个候选，整个过程受 `budgets.select_ms` 约束，超时即 NoFill。
//!
//! 打分阶段没有外部副作用，超时直接丢弃。扣费阶段在独立任务里跑完，不随调用方取消：
//! 调用方已放弃时退还预算并释放频次名额，否则记录曝光后交付结果。

mod frequency;
mod rules;
mod scorer;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::config::AdsConfig;
use crate::errors::Result;
use crate::events::EventRecorder;
use crate::services::catalog::{Catalog, CatalogService, CreativePayload, CreativeStatus};
use crate::services::fraud::{FraudGuard, Signal};
use crate::services::segments::SegmentStore;
use crate::storage::{EventKind, ImpressionEvent};

pub use frequency::{FrequencyTracker, SessionCounters, SessionTracker};
pub use rules::{Dimension, RuleContext, RuleOutcome, RuleSummary, TargetingRule, evaluate, summarize};
pub use scorer::{RankedCandidate, ScoreBreakdown, frequency_penalty, rank, score};

/// 活动预算计数器（持久化、原子“加并校验”）
#[async_trait]
pub trait SpendLedger: Send + Sync {
    async fn spent(&self, campaign_ids: &[String]) -> Result<HashMap<String, i64>>;
    /// `spent + amount <= budget` 时扣费并返回 true
    async fn try_charge(
        &self,
        campaign_id: &str,
        amount_cents: i64,
        budget_cents: i64,
    ) -> Result<bool>;
    /// 退还一次已成功的扣费（曝光最终没有交付）
    async fn refund(&self, campaign_id: &str, amount_cents: i64) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotContext {
    pub thread_id: String,
    /// 广告位所属发布者，作为曝光的 earner
    #[serde(default)]
    pub publisher_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl SlotContext {
    /// 没有显式会话时以线程作为会话
    pub fn session_key(&self) -> &str {
        self.session_id.as_deref().unwrap_or(&self.thread_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRequest {
    pub viewer_id: String,
    #[serde(default)]
    pub context_keywords: Vec<String>,
    pub slot_context: SlotContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServedAd {
    pub impression_id: String,
    pub creative_id: String,
    pub campaign_id: String,
    pub score: f64,
    pub payload: CreativePayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoFillReason {
    RatioLimit,
    NoEligible,
    BelowThreshold,
    BudgetExhausted,
    Timeout,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdDecision {
    Fill(ServedAd),
    NoFill(NoFillReason),
}

/// 打分阶段的结果，交给扣费阶段
struct FillPlan {
    catalog: Arc<Catalog>,
    ranked: Vec<RankedCandidate>,
}

fn served_ad(catalog: &Catalog, candidate: &RankedCandidate) -> Option<ServedAd> {
    let creative = catalog
        .creatives
        .iter()
        .find(|c| c.id == candidate.creative_id)?;
    Some(ServedAd {
        impression_id: uuid::Uuid::new_v4().to_string(),
        creative_id: creative.id.clone(),
        campaign_id: candidate.campaign_id.clone(),
        score: candidate.breakdown.score,
        payload: creative.payload.clone(),
    })
}

pub struct AdTargetingEngine {
    config: AdsConfig,
    budget: Duration,
    catalog: Arc<CatalogService>,
    segments: Arc<SegmentStore>,
    spend: Arc<dyn SpendLedger>,
    fraud: Arc<FraudGuard>,
    recorder: EventRecorder,
    frequency: FrequencyTracker,
    sessions: SessionTracker,
}

impl AdTargetingEngine {
    pub fn new(
        config: AdsConfig,
        budget: Duration,
        catalog: Arc<CatalogService>,
        segments: Arc<SegmentStore>,
        spend: Arc<dyn SpendLedger>,
        fraud: Arc<FraudGuard>,
        recorder: EventRecorder,
    ) -> Self {
        let frequency = FrequencyTracker::new(
            config.tracker_capacity,
            config.frequency_period_secs,
            config.frequency_cap,
        );
        let sessions = SessionTracker::new(
            config.tracker_capacity,
            config.session_ttl_secs,
            config.max_ad_ratio,
        );
        Self {
            config,
            budget,
            catalog,
            segments,
            spend,
            fraud,
            recorder,
            frequency,
            sessions,
        }
    }

    pub async fn select_ad(self: &Arc<Self>, request: &AdRequest) -> AdDecision {
        let now = Utc::now();
        let deadline = tokio::time::Instant::now() + self.budget;

        let plan = match tokio::time::timeout_at(deadline, self.plan(request, now)).await {
            Ok(Ok(plan)) => plan,
            Ok(Err(reason)) => return AdDecision::NoFill(reason),
            Err(_) => return self.timed_out(request),
        };

        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(self);
        let owned = request.clone();
        tokio::spawn(async move { engine.commit(owned, plan, now, tx).await });

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => AdDecision::NoFill(NoFillReason::StoreUnavailable),
            // rx 在此被丢弃，扣费任务据此退款
            Err(_) => self.timed_out(request),
        }
    }

    fn timed_out(&self, request: &AdRequest) -> AdDecision {
        warn!(
            "Ad selection for viewer {} exceeded {:?}",
            request.viewer_id, self.budget
        );
        AdDecision::NoFill(NoFillReason::Timeout)
    }

    /// 打分排序，只读
    async fn plan(
        &self,
        request: &AdRequest,
        now: DateTime<Utc>,
    ) -> std::result::Result<FillPlan, NoFillReason> {
        let viewer = request.viewer_id.as_str();
        let session = request.slot_context.session_key();

        if !self.sessions.observe_context(viewer, session) {
            debug!("Ad ratio reached for viewer {} session {}", viewer, session);
            return Err(NoFillReason::RatioLimit);
        }

        let lookup = self.segments.lookup(viewer);
        if lookup.stale {
            debug!(
                "Serving viewer {} with stale segments (computed_at={:?})",
                viewer, lookup.computed_at
            );
        }
        let ctx = RuleContext::new(
            lookup.segments,
            &request.context_keywords,
            request.slot_context.country.as_deref(),
            now.hour() as u8,
        );

        let catalog = self.catalog.snapshot();
        let serving: Vec<_> = catalog
            .creatives
            .iter()
            .filter(|creative| creative.status == CreativeStatus::Active)
            .filter_map(|creative| {
                catalog
                    .campaign(&creative.campaign_id)
                    .filter(|campaign| campaign.is_serving_at(now))
                    .map(|campaign| (creative, campaign))
            })
            .collect();
        if serving.is_empty() {
            return Err(NoFillReason::NoEligible);
        }

        let campaign_ids: Vec<String> = serving
            .iter()
            .map(|(_, campaign)| campaign.id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let spent = match self.spend.spent(&campaign_ids).await {
            Ok(spent) => spent,
            Err(e) => {
                warn!("Campaign spend unavailable, not filling slot: {}", e);
                return Err(NoFillReason::StoreUnavailable);
            }
        };

        let eligible: Vec<_> = serving
            .into_iter()
            .filter(|(creative, campaign)| {
                let spent = spent.get(&campaign.id).copied().unwrap_or(0);
                campaign.budget_cents - spent >= creative.bid_cents
            })
            .filter(|(_, campaign)| !self.frequency.is_capped(viewer, &campaign.id, now))
            .filter_map(|(creative, campaign)| {
                let summary = summarize(&creative.rules, &ctx);
                summary.eligible.then_some((creative, campaign, summary))
            })
            .collect();
        if eligible.is_empty() {
            return Err(NoFillReason::NoEligible);
        }

        let pool_max_bid = eligible
            .iter()
            .map(|(creative, _, _)| creative.bid_cents)
            .max()
            .unwrap_or(0);
        let period = self.config.frequency_period_secs as f64;

        let mut ranked: Vec<RankedCandidate> = eligible
            .iter()
            .map(|(creative, campaign, summary)| {
                let ages = self.frequency.recent_ages(viewer, &campaign.id, now);
                let penalty = frequency_penalty(
                    &ages,
                    period,
                    self.config.frequency_cap,
                    self.config.frequency_penalty_weight,
                );
                RankedCandidate {
                    creative_id: creative.id.clone(),
                    campaign_id: campaign.id.clone(),
                    bid_cents: creative.bid_cents,
                    created_at: creative.created_at,
                    breakdown: score(
                        summary.segment_match,
                        summary.keyword_match,
                        creative.bid_cents,
                        pool_max_bid,
                        penalty,
                    ),
                }
            })
            .filter(|candidate| candidate.breakdown.score >= self.config.min_score)
            .collect();
        if ranked.is_empty() {
            return Err(NoFillReason::BelowThreshold);
        }
        rank(&mut ranked);

        Ok(FillPlan { catalog, ranked })
    }

    /// 按排名依次占频次名额并扣费，第一个成功的候选即为结果
    async fn commit(
        &self,
        request: AdRequest,
        plan: FillPlan,
        now: DateTime<Utc>,
        tx: oneshot::Sender<AdDecision>,
    ) {
        let viewer = request.viewer_id.as_str();
        let mut exhausted = HashSet::new();
        for candidate in plan.ranked {
            if exhausted.contains(&candidate.campaign_id) {
                continue;
            }
            if !self.frequency.try_reserve(viewer, &candidate.campaign_id, now) {
                continue;
            }

            let budget = plan
                .catalog
                .campaign(&candidate.campaign_id)
                .map(|c| c.budget_cents)
                .unwrap_or(0);
            match self
                .spend
                .try_charge(&candidate.campaign_id, candidate.bid_cents, budget)
                .await
            {
                Ok(true) => {
                    let served = match served_ad(&plan.catalog, &candidate) {
                        Some(served) if !tx.is_closed() => served,
                        Some(_) => {
                            warn!(
                                "Ad selection for viewer {} abandoned after charging {}, refunding",
                                viewer, candidate.campaign_id
                            );
                            self.undo_charge(viewer, &candidate, now).await;
                            return;
                        }
                        None => {
                            self.undo_charge(viewer, &candidate, now).await;
                            continue;
                        }
                    };
                    // 先记录再交付：与扣费对应的曝光一定落账
                    self.record_fill(&request, &candidate, &served, now);
                    if tx.send(AdDecision::Fill(served)).is_err() {
                        debug!(
                            "Viewer {} left before the fill for {} was delivered",
                            viewer, candidate.campaign_id
                        );
                    }
                    return;
                }
                Ok(false) => {
                    self.frequency.release(viewer, &candidate.campaign_id, now);
                    debug!("Campaign {} budget exhausted by a concurrent fill", candidate.campaign_id);
                    exhausted.insert(candidate.campaign_id);
                }
                Err(e) => {
                    self.frequency.release(viewer, &candidate.campaign_id, now);
                    warn!("Budget charge failed for {}: {}", candidate.campaign_id, e);
                    let _ = tx.send(AdDecision::NoFill(NoFillReason::StoreUnavailable));
                    return;
                }
            }
        }

        let _ = tx.send(AdDecision::NoFill(NoFillReason::BudgetExhausted));
    }

    async fn undo_charge(&self, viewer: &str, candidate: &RankedCandidate, now: DateTime<Utc>) {
        self.frequency.release(viewer, &candidate.campaign_id, now);
        if let Err(e) = self
            .spend
            .refund(&candidate.campaign_id, candidate.bid_cents)
            .await
        {
            warn!(
                "Refund of {} cents to {} failed: {}",
                candidate.bid_cents, candidate.campaign_id, e
            );
        }
    }

    /// 扣费成功后：记录会话填充、风控评估、发出曝光事件
    fn record_fill(
        &self,
        request: &AdRequest,
        candidate: &RankedCandidate,
        served: &ServedAd,
        now: DateTime<Utc>,
    ) {
        let slot = &request.slot_context;
        self.sessions
            .record_fill(&request.viewer_id, slot.session_key());

        let assessment = self.fraud.assess(
            &request.viewer_id,
            EventKind::Impression,
            Signal {
                campaign_id: &candidate.campaign_id,
                device_id: slot.device_id.as_deref(),
            },
        );

        self.recorder.record_impression(ImpressionEvent {
            event_id: served.impression_id.clone(),
            creative_id: served.creative_id.clone(),
            campaign_id: candidate.campaign_id.clone(),
            viewer_id: request.viewer_id.clone(),
            thread_id: slot.thread_id.clone(),
            earner_id: slot.publisher_id.clone(),
            score: served.score,
            fraud_state: assessment.state,
            fraud_score: assessment.score,
            served_at: now,
        });
        trace!(
            "Filled slot for {} with {} (score {:.3}, breakdown {:?})",
            request.viewer_id, served.creative_id, served.score, candidate.breakdown
        );
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }
}
