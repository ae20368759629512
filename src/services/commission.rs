//! CommissionCalculator：按费率表计算佣金
//!
//! 金额是 (归因, 费率表) 的纯函数：`quote` 不读写任何状态。
//! 落库以 `(attribution_id, kind)` 为唯一键，重复调用返回已存在的记录。
//! 冲正写一条新的负数记录，从不修改原记录。

use std::sync::Arc;

use sea_orm::{ConnectionTrait, TransactionTrait};
use serde::Serialize;
use tracing::info;

use crate::errors::{EngineError, Result};
use crate::services::catalog::{Catalog, CatalogService, RateEntry, RateRule};
use crate::storage::backend::CommissionDraft;
use crate::storage::{
    Attribution, Commission, CommissionKind, CommissionStatus, EventKind, SeaOrmStorage,
};

pub const WILDCARD: &str = "*";
pub const DEFAULT_CLICK_EARNER_TYPE: &str = "affiliate";
pub const DEFAULT_IMPRESSION_EARNER_TYPE: &str = "publisher";
pub const MAX_EXPORT_BATCH: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionQuote {
    pub amount_cents: i64,
    /// 可读的规则描述，例如 `percentage:1000bps`
    pub rate_applied: String,
}

/// 依次尝试 (活动, 类型)、(活动, *)、(*, 类型)、(*, *)
pub fn lookup_rate<'a>(
    rates: &'a [RateEntry],
    campaign_id: &str,
    earner_type: &str,
) -> Option<&'a RateRule> {
    let candidates = [
        (campaign_id, earner_type),
        (campaign_id, WILDCARD),
        (WILDCARD, earner_type),
        (WILDCARD, WILDCARD),
    ];
    candidates.iter().find_map(|(campaign, kind)| {
        rates
            .iter()
            .find(|r| r.campaign_id == *campaign && r.earner_type == *kind)
            .map(|r| &r.rule)
    })
}

/// 四舍五入（half-up），金额非负
fn basis_points(value_cents: i64, bps: u32) -> i64 {
    let scaled = value_cents.max(0) as i128 * bps as i128;
    ((scaled + 5_000) / 10_000) as i64
}

pub fn apply_rule(rule: &RateRule, value_cents: i64) -> CommissionQuote {
    match rule {
        RateRule::Flat { amount_cents } => CommissionQuote {
            amount_cents: *amount_cents,
            rate_applied: format!("flat:{}c", amount_cents),
        },
        RateRule::Percentage { bps } => CommissionQuote {
            amount_cents: basis_points(value_cents, *bps),
            rate_applied: format!("percentage:{}bps", bps),
        },
        RateRule::Tiered { tiers } => {
            let tier = tiers
                .iter()
                .filter(|t| t.min_value_cents <= value_cents)
                .max_by_key(|t| t.min_value_cents);
            match tier {
                Some(tier) => CommissionQuote {
                    amount_cents: basis_points(value_cents, tier.bps),
                    rate_applied: format!("tiered:{}bps@{}c", tier.bps, tier.min_value_cents),
                },
                None => CommissionQuote {
                    amount_cents: 0,
                    rate_applied: "tiered:below_first_tier".to_string(),
                },
            }
        }
    }
}

pub fn earner_type_for<'a>(catalog: &'a Catalog, attribution: &Attribution) -> &'a str {
    catalog
        .earner_type(&attribution.earner_id)
        .unwrap_or(match attribution.credited_event_kind {
            EventKind::Click => DEFAULT_CLICK_EARNER_TYPE,
            EventKind::Impression => DEFAULT_IMPRESSION_EARNER_TYPE,
        })
}

pub fn quote(attribution: &Attribution, catalog: &Catalog) -> CommissionQuote {
    let earner_type = earner_type_for(catalog, attribution);
    match lookup_rate(&catalog.rates, &attribution.campaign_id, earner_type) {
        Some(rule) => apply_rule(rule, attribution.value_cents),
        None => CommissionQuote {
            amount_cents: 0,
            rate_applied: "none".to_string(),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBatch {
    pub records: Vec<Commission>,
    /// 确认这批记录时提交的位置
    pub next_cursor: i64,
}

pub struct CommissionCalculator {
    storage: Arc<SeaOrmStorage>,
    catalog: Arc<CatalogService>,
}

impl CommissionCalculator {
    pub fn new(storage: Arc<SeaOrmStorage>, catalog: Arc<CatalogService>) -> Self {
        Self { storage, catalog }
    }

    /// 在调用方的事务里写入 pending 佣金
    pub async fn calculate_in<C: ConnectionTrait>(
        conn: &C,
        attribution: &Attribution,
        catalog: &Catalog,
    ) -> Result<Commission> {
        let quote = quote(attribution, catalog);
        SeaOrmStorage::insert_commission_once(
            conn,
            &CommissionDraft {
                attribution_id: attribution.id.clone(),
                kind: CommissionKind::Accrual,
                earner_id: attribution.earner_id.clone(),
                campaign_id: attribution.campaign_id.clone(),
                amount_cents: quote.amount_cents,
                rate_applied: quote.rate_applied,
                status: CommissionStatus::Pending,
            },
        )
        .await
    }

    pub async fn calculate(&self, attribution: &Attribution) -> Result<Commission> {
        let catalog = self.catalog.snapshot();
        Self::calculate_in(self.storage.get_db(), attribution, &catalog).await
    }

    /// 退款等场景：写一条负数的 reversed 记录
    pub async fn reverse(&self, attribution_id: &str, reason: &str) -> Result<Commission> {
        let txn = self.storage.get_db().begin().await?;
        let accrual =
            SeaOrmStorage::find_commission_by_attribution(&txn, attribution_id, CommissionKind::Accrual)
                .await?
                .ok_or_else(|| {
                    EngineError::not_found(format!(
                        "no commission for attribution '{}'",
                        attribution_id
                    ))
                })?;

        let reason = reason.trim();
        let rate_applied = if reason.is_empty() {
            format!("reversal of {}", accrual.rate_applied)
        } else {
            let reason: String = reason.chars().take(200).collect();
            format!("reversal of {}: {}", accrual.rate_applied, reason)
        };

        let reversal = SeaOrmStorage::insert_commission_once(
            &txn,
            &CommissionDraft {
                attribution_id: accrual.attribution_id.clone(),
                kind: CommissionKind::Reversal,
                earner_id: accrual.earner_id.clone(),
                campaign_id: accrual.campaign_id.clone(),
                amount_cents: -accrual.amount_cents,
                rate_applied,
                status: CommissionStatus::Reversed,
            },
        )
        .await?;
        txn.commit().await?;

        info!(
            "Commission for attribution {} reversed ({} cents)",
            attribution_id, reversal.amount_cents
        );
        Ok(reversal)
    }

    pub async fn mark_paid(&self, commission_id: &str) -> Result<Commission> {
        let commission = self.storage.mark_commission_paid(commission_id).await?;
        info!("Commission {} marked paid", commission_id);
        Ok(commission)
    }

    pub async fn get(&self, commission_id: &str) -> Result<Option<Commission>> {
        self.storage.get_commission(commission_id).await
    }

    /// 游标之后的记录；不推进游标。先为新提交的记录分配导出位置
    pub async fn export(&self, consumer: &str, limit: u64) -> Result<ExportBatch> {
        if consumer.trim().is_empty() {
            return Err(EngineError::validation("consumer is required"));
        }
        self.storage.publish_commissions(MAX_EXPORT_BATCH).await?;
        let cursor = self.storage.export_cursor(consumer).await?;
        let records = self
            .storage
            .commissions_after(cursor, limit.clamp(1, MAX_EXPORT_BATCH))
            .await?;
        let next_cursor = records
            .last()
            .and_then(|c| c.export_position)
            .unwrap_or(cursor);
        Ok(ExportBatch {
            records,
            next_cursor,
        })
    }

    pub async fn ack(&self, consumer: &str, position: i64) -> Result<i64> {
        if consumer.trim().is_empty() {
            return Err(EngineError::validation("consumer is required"));
        }
        let current = self.storage.advance_export_cursor(consumer, position).await?;
        info!("Export cursor for {} at {}", consumer, current);
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::Tier;
    use chrono::Utc;

    fn rate(campaign: &str, earner_type: &str, rule: RateRule) -> RateEntry {
        RateEntry {
            campaign_id: campaign.into(),
            earner_type: earner_type.into(),
            rule,
        }
    }

    fn attribution(kind: EventKind, earner: &str, value_cents: i64) -> Attribution {
        Attribution {
            id: "attr-1".into(),
            conversion_id: "X9".into(),
            credited_event_id: "ev-1".into(),
            credited_event_kind: kind,
            credited_actor: "U2".into(),
            earner_id: earner.into(),
            campaign_id: "C1".into(),
            value_cents,
            window_days: 30,
            attributed_at: Utc::now(),
        }
    }

    #[test]
    fn test_rate_lookup_order() {
        let rates = vec![
            rate("*", "*", RateRule::Flat { amount_cents: 1 }),
            rate("*", "affiliate", RateRule::Flat { amount_cents: 2 }),
            rate("C1", "*", RateRule::Flat { amount_cents: 3 }),
            rate("C1", "affiliate", RateRule::Flat { amount_cents: 4 }),
        ];
        let pick = |c: &str, t: &str| match lookup_rate(&rates, c, t) {
            Some(RateRule::Flat { amount_cents }) => *amount_cents,
            _ => -1,
        };
        assert_eq!(pick("C1", "affiliate"), 4);
        assert_eq!(pick("C1", "creator"), 3);
        assert_eq!(pick("C2", "affiliate"), 2);
        assert_eq!(pick("C2", "creator"), 1);
        assert!(lookup_rate(&rates[1..2], "C2", "creator").is_none());
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        let rule = RateRule::Percentage { bps: 1000 };
        assert_eq!(apply_rule(&rule, 5000).amount_cents, 500);
        // 4.5 → 5
        assert_eq!(apply_rule(&rule, 45).amount_cents, 5);
        // 4.4 → 4
        assert_eq!(apply_rule(&rule, 44).amount_cents, 4);
        assert_eq!(apply_rule(&rule, 5000).rate_applied, "percentage:1000bps");
    }

    #[test]
    fn test_tiered_uses_highest_reached_tier() {
        let rule = RateRule::Tiered {
            tiers: vec![
                Tier {
                    min_value_cents: 0,
                    bps: 500,
                },
                Tier {
                    min_value_cents: 10_000,
                    bps: 750,
                },
            ],
        };
        let low = apply_rule(&rule, 9_999);
        assert_eq!(low.amount_cents, 500);
        assert_eq!(low.rate_applied, "tiered:500bps@0c");

        let high = apply_rule(&rule, 20_000);
        assert_eq!(high.amount_cents, 1_500);
        assert_eq!(high.rate_applied, "tiered:750bps@10000c");
    }

    #[test]
    fn test_earner_type_defaults() {
        let mut catalog = Catalog::default();
        catalog.rates = vec![
            rate("C1", "affiliate", RateRule::Flat { amount_cents: 100 }),
            rate("C1", "publisher", RateRule::Flat { amount_cents: 10 }),
            rate("C1", "creator", RateRule::Flat { amount_cents: 300 }),
        ];
        assert_eq!(quote(&attribution(EventKind::Click, "E1", 5000), &catalog).amount_cents, 100);
        assert_eq!(
            quote(&attribution(EventKind::Impression, "P1", 5000), &catalog).amount_cents,
            10
        );

        catalog.earners.insert("E1".into(), "creator".into());
        assert_eq!(quote(&attribution(EventKind::Click, "E1", 5000), &catalog).amount_cents, 300);
    }

    #[test]
    fn test_quote_is_deterministic() {
        let mut catalog = Catalog::default();
        catalog.rates = vec![rate("*", "*", RateRule::Percentage { bps: 333 })];
        let attr = attribution(EventKind::Click, "E1", 12_345);
        let first = quote(&attr, &catalog);
        for _ in 0..10 {
            assert_eq!(quote(&attr, &catalog), first);
        }
    }

    #[test]
    fn test_no_rate_is_zero() {
        let quote = quote(&attribution(EventKind::Click, "E1", 5000), &Catalog::default());
        assert_eq!(quote.amount_cents, 0);
        assert_eq!(quote.rate_applied, "none");
    }
}
