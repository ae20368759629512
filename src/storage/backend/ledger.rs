//! 转化认领与归因写入
//!
//! 这里的函数都接受任意 `ConnectionTrait`，由调用方在同一事务里组合：
//! 认领 conversion id → 窗口搜索 → 写归因与佣金 → 记录结果。

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, sea_query::Expr,
};

use super::SeaOrmStorage;
use super::converters::{attribution_to_active_model, model_to_attribution, parse_fraud_state};
use crate::errors::Result;
use crate::storage::{Attribution, Conversion, EventKind, Touch};

use migration::entities::{attribution, click_event, conversion, impression_event};

/// 认领中的转化状态
pub const OUTCOME_PENDING: &str = "pending";

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// 本次调用获得了该 conversion id
    Claimed,
    /// 已被处理过（或正在被处理），附带已存储的记录
    Existing(conversion::Model),
}

impl SeaOrmStorage {
    /// 以 conversion id 为唯一键插入；冲突时返回既有记录
    pub async fn claim_conversion<C: ConnectionTrait>(
        conn: &C,
        conversion: &Conversion,
        received_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let model = conversion::ActiveModel {
            conversion_id: Set(conversion.conversion_id.clone()),
            campaign_id: Set(conversion.campaign_id.clone()),
            buyer_id: Set(conversion.buyer_id.clone()),
            value_cents: Set(conversion.value_cents),
            received_at: Set(received_at),
            outcome: Set(OUTCOME_PENDING.to_string()),
            reason: Set(None),
            attribution_id: Set(None),
        };

        let inserted = conversion::Entity::insert(model)
            .on_conflict(
                OnConflict::column(conversion::Column::ConversionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        if inserted > 0 {
            return Ok(ClaimOutcome::Claimed);
        }

        let existing = conversion::Entity::find_by_id(conversion.conversion_id.clone())
            .one(conn)
            .await?;
        match existing {
            Some(model) => Ok(ClaimOutcome::Existing(model)),
            // 冲突后又读不到，只可能是并发的认领事务回滚了
            None => Err(crate::errors::EngineError::store_unavailable(format!(
                "conversion '{}' claim raced with a rolled back writer",
                conversion.conversion_id
            ))),
        }
    }

    pub async fn find_conversion<C: ConnectionTrait>(
        conn: &C,
        conversion_id: &str,
    ) -> Result<Option<conversion::Model>> {
        Ok(conversion::Entity::find_by_id(conversion_id.to_string())
            .one(conn)
            .await?)
    }

    /// 在 `[from, to]` 内查找该 actor 在该活动下最近的一次点击或曝光
    ///
    /// 同一时刻点击优先于曝光；同类事件按行号取后写入者。
    pub async fn last_touch<C: ConnectionTrait>(
        conn: &C,
        actor_id: &str,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<Touch>> {
        let click = click_event::Entity::find()
            .filter(click_event::Column::ActorId.eq(actor_id))
            .filter(click_event::Column::CampaignId.eq(campaign_id))
            .filter(click_event::Column::ClickedAt.gte(from))
            .filter(click_event::Column::ClickedAt.lte(to))
            .order_by_desc(click_event::Column::ClickedAt)
            .order_by_desc(click_event::Column::Id)
            .limit(1)
            .one(conn)
            .await?
            .map(|m| Touch {
                event_id: m.event_id,
                kind: EventKind::Click,
                actor_id: m.actor_id,
                earner_id: m.earner_id,
                campaign_id: m.campaign_id,
                fraud_state: parse_fraud_state(&m.fraud_state),
                at: m.clicked_at,
                row_id: m.id,
            });

        let impression = impression_event::Entity::find()
            .filter(impression_event::Column::ViewerId.eq(actor_id))
            .filter(impression_event::Column::CampaignId.eq(campaign_id))
            .filter(impression_event::Column::ServedAt.gte(from))
            .filter(impression_event::Column::ServedAt.lte(to))
            .order_by_desc(impression_event::Column::ServedAt)
            .order_by_desc(impression_event::Column::Id)
            .limit(1)
            .one(conn)
            .await?
            .map(|m| Touch {
                event_id: m.event_id,
                kind: EventKind::Impression,
                actor_id: m.viewer_id,
                earner_id: m.earner_id,
                campaign_id: m.campaign_id,
                fraud_state: parse_fraud_state(&m.fraud_state),
                at: m.served_at,
                row_id: m.id,
            });

        Ok(match (click, impression) {
            (Some(c), Some(i)) => Some(if i.at > c.at { i } else { c }),
            (c, i) => c.or(i),
        })
    }

    pub async fn insert_attribution<C: ConnectionTrait>(
        conn: &C,
        attr: &Attribution,
    ) -> Result<()> {
        attribution::Entity::insert(attribution_to_active_model(attr))
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    pub async fn find_attribution<C: ConnectionTrait>(
        conn: &C,
        attribution_id: &str,
    ) -> Result<Option<Attribution>> {
        Ok(attribution::Entity::find_by_id(attribution_id.to_string())
            .one(conn)
            .await?
            .map(model_to_attribution))
    }

    /// 写入最终结果，认领状态随之结束
    pub async fn complete_conversion<C: ConnectionTrait>(
        conn: &C,
        conversion_id: &str,
        outcome: &str,
        reason: Option<&str>,
        attribution_id: Option<&str>,
    ) -> Result<()> {
        conversion::Entity::update_many()
            .col_expr(conversion::Column::Outcome, Expr::value(outcome))
            .col_expr(
                conversion::Column::Reason,
                Expr::value(reason.map(str::to_string)),
            )
            .col_expr(
                conversion::Column::AttributionId,
                Expr::value(attribution_id.map(str::to_string)),
            )
            .filter(conversion::Column::ConversionId.eq(conversion_id))
            .exec(conn)
            .await?;
        Ok(())
    }
}
