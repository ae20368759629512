//! AttributionLedger：把转化归因到最近一次合格的点击或曝光
//!
//! 每个转化一个事务：认领 conversion id → 回看窗口内搜索 last-touch → 写归因与佣金 → 记录结果。
//! conversion id 上的唯一约束保证同一转化只会被计算一次；重放直接返回已存储的结果。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::TransactionTrait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::errors::{EngineError, Result};
use crate::services::catalog::CatalogService;
use crate::services::commission::CommissionCalculator;
use crate::services::fraud::FraudGuard;
use crate::storage::backend::{ClaimOutcome, OUTCOME_PENDING};
use crate::storage::{
    Attribution, Commission, CommissionKind, Conversion, FraudState, ReasonCode, SeaOrmStorage,
};

pub const OUTCOME_ATTRIBUTED: &str = "attributed";
pub const OUTCOME_NO_ATTRIBUTION: &str = "no_attribution";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoAttributionReason {
    NoQualifyingEvent,
    /// 最近一次触达来自已封禁的 actor
    BlockedTouch,
    SelfReferral,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Attributed {
        attribution: Attribution,
        commission: Commission,
    },
    NoAttribution(NoAttributionReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub conversion_id: String,
    pub outcome: ConversionOutcome,
    /// 是否为重放（返回的是已存储的结果）
    pub replayed: bool,
}

pub struct AttributionLedger {
    storage: Arc<SeaOrmStorage>,
    catalog: Arc<CatalogService>,
    fraud: Arc<FraudGuard>,
    window_days: u32,
    budget: Duration,
}

impl AttributionLedger {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        catalog: Arc<CatalogService>,
        fraud: Arc<FraudGuard>,
        window_days: u32,
        budget: Duration,
    ) -> Self {
        Self {
            storage,
            catalog,
            fraud,
            window_days: window_days.max(1),
            budget,
        }
    }

    fn validate(conversion: &Conversion) -> Result<()> {
        if conversion.conversion_id.trim().is_empty()
            || conversion.campaign_id.trim().is_empty()
            || conversion.buyer_id.trim().is_empty()
        {
            return Err(EngineError::validation(
                "conversionId, campaignId and buyerId are required",
            ));
        }
        if conversion.value_cents < 0 {
            return Err(EngineError::validation("value must not be negative"));
        }
        Ok(())
    }

    /// 超时会丢弃未提交的事务，调用方可以安全重试
    #[instrument(skip(self, conversion), fields(conversion_id = %conversion.conversion_id))]
    pub async fn record_conversion(&self, conversion: &Conversion) -> Result<ConversionResult> {
        Self::validate(conversion)?;

        let result = tokio::time::timeout(self.budget, self.record_within_budget(conversion))
            .await
            .map_err(|_| {
                EngineError::timeout(format!(
                    "conversion '{}' not recorded within {:?}",
                    conversion.conversion_id, self.budget
                ))
            })??;

        if !result.replayed {
            self.feed_fraud_guard(conversion, &result.outcome);
        }
        Ok(result)
    }

    async fn record_within_budget(&self, conversion: &Conversion) -> Result<ConversionResult> {
        let received_at = Utc::now();
        let txn = self.storage.get_db().begin().await?;

        if let ClaimOutcome::Existing(stored) =
            SeaOrmStorage::claim_conversion(&txn, conversion, received_at).await?
        {
            txn.rollback().await?;
            if stored.campaign_id != conversion.campaign_id
                || stored.buyer_id != conversion.buyer_id
                || stored.value_cents != conversion.value_cents
            {
                warn!(
                    "Replay of conversion {} carries a different payload; returning the stored result",
                    conversion.conversion_id
                );
            }
            return self
                .replay(
                    &conversion.conversion_id,
                    &stored.outcome,
                    stored.reason.as_deref(),
                    stored.attribution_id.as_deref(),
                )
                .await;
        }

        let from = received_at - chrono::Duration::days(self.window_days as i64);
        let touch = SeaOrmStorage::last_touch(
            &txn,
            &conversion.buyer_id,
            &conversion.campaign_id,
            from,
            received_at,
        )
        .await?;

        let outcome = match touch {
            None => ConversionOutcome::NoAttribution(NoAttributionReason::NoQualifyingEvent),
            // 只看最近一次触达，不回退到更早的触达
            Some(touch) if touch.fraud_state == FraudState::Blocked => {
                debug!(
                    "Last touch {} for conversion {} came from a blocked actor",
                    touch.event_id, conversion.conversion_id
                );
                ConversionOutcome::NoAttribution(NoAttributionReason::BlockedTouch)
            }
            Some(touch) if touch.earner_id == conversion.buyer_id => {
                ConversionOutcome::NoAttribution(NoAttributionReason::SelfReferral)
            }
            Some(touch) => {
                let attribution = Attribution {
                    id: uuid::Uuid::new_v4().to_string(),
                    conversion_id: conversion.conversion_id.clone(),
                    credited_event_id: touch.event_id,
                    credited_event_kind: touch.kind,
                    credited_actor: touch.actor_id,
                    earner_id: touch.earner_id,
                    campaign_id: touch.campaign_id,
                    value_cents: conversion.value_cents,
                    window_days: self.window_days,
                    attributed_at: received_at,
                };
                SeaOrmStorage::insert_attribution(&txn, &attribution).await?;
                let catalog = self.catalog.snapshot();
                let commission =
                    CommissionCalculator::calculate_in(&txn, &attribution, &catalog).await?;
                ConversionOutcome::Attributed {
                    attribution,
                    commission,
                }
            }
        };

        match &outcome {
            ConversionOutcome::Attributed { attribution, .. } => {
                SeaOrmStorage::complete_conversion(
                    &txn,
                    &conversion.conversion_id,
                    OUTCOME_ATTRIBUTED,
                    None,
                    Some(&attribution.id),
                )
                .await?
            }
            ConversionOutcome::NoAttribution(reason) => {
                SeaOrmStorage::complete_conversion(
                    &txn,
                    &conversion.conversion_id,
                    OUTCOME_NO_ATTRIBUTION,
                    Some(reason.as_ref()),
                    None,
                )
                .await?
            }
        }
        txn.commit().await?;

        match &outcome {
            ConversionOutcome::Attributed {
                attribution,
                commission,
            } => info!(
                "Conversion {} attributed to {} ({}), commission {} cents for {}",
                conversion.conversion_id,
                attribution.credited_event_id,
                attribution.credited_event_kind,
                commission.amount_cents,
                commission.earner_id
            ),
            ConversionOutcome::NoAttribution(reason) => info!(
                "Conversion {} recorded without attribution: {}",
                conversion.conversion_id, reason
            ),
        }

        Ok(ConversionResult {
            conversion_id: conversion.conversion_id.clone(),
            outcome,
            replayed: false,
        })
    }

    async fn replay(
        &self,
        conversion_id: &str,
        outcome: &str,
        reason: Option<&str>,
        attribution_id: Option<&str>,
    ) -> Result<ConversionResult> {
        let db = self.storage.get_db();
        let outcome = match outcome {
            OUTCOME_ATTRIBUTED => {
                let attribution_id = attribution_id.ok_or_else(|| {
                    EngineError::database_operation(format!(
                        "conversion '{}' is attributed but has no attribution id",
                        conversion_id
                    ))
                })?;
                let attribution = SeaOrmStorage::find_attribution(db, attribution_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::database_operation(format!(
                            "attribution '{}' missing",
                            attribution_id
                        ))
                    })?;
                let commission = SeaOrmStorage::find_commission_by_attribution(
                    db,
                    attribution_id,
                    CommissionKind::Accrual,
                )
                .await?
                .ok_or_else(|| {
                    EngineError::database_operation(format!(
                        "commission for attribution '{}' missing",
                        attribution_id
                    ))
                })?;
                ConversionOutcome::Attributed {
                    attribution,
                    commission,
                }
            }
            OUTCOME_NO_ATTRIBUTION => {
                let reason = reason
                    .and_then(|r| r.parse::<NoAttributionReason>().ok())
                    .unwrap_or(NoAttributionReason::NoQualifyingEvent);
                ConversionOutcome::NoAttribution(reason)
            }
            OUTCOME_PENDING => {
                return Err(EngineError::store_unavailable(format!(
                    "conversion '{}' is still being processed",
                    conversion_id
                )));
            }
            other => {
                return Err(EngineError::database_operation(format!(
                    "conversion '{}' has unknown outcome '{}'",
                    conversion_id, other
                )));
            }
        };

        debug!("Conversion {} replayed", conversion_id);
        Ok(ConversionResult {
            conversion_id: conversion_id.to_string(),
            outcome,
            replayed: true,
        })
    }

    /// 只在首次处理时喂给风控，重放不重复计数
    fn feed_fraud_guard(&self, conversion: &Conversion, outcome: &ConversionOutcome) {
        if matches!(
            outcome,
            ConversionOutcome::NoAttribution(NoAttributionReason::SelfReferral)
        ) {
            let assessment = self
                .fraud
                .flag(&conversion.buyer_id, ReasonCode::SelfReferral);
            warn!(
                "Self-referral by {} on conversion {} (state {})",
                conversion.buyer_id, conversion.conversion_id, assessment.state
            );
        }
        self.fraud.record_conversion(&conversion.buyer_id);
    }
}
