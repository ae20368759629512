//! 佣金记录与导出游标
//!
//! 导出位置 `export_seq` 只分配给已提交的记录，且在计数行的行锁下按顺序分配：
//! 先提交的事务先拿到编号，进行中的事务提交后只会拿到比任何已发布位置都大的编号。

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, EntityTrait, ExprTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, sea_query::Expr,
};
use tracing::debug;

use super::SeaOrmStorage;
use super::converters::model_to_commission;
use crate::errors::{EngineError, Result};
use crate::storage::{Commission, CommissionKind, CommissionStatus};

use migration::entities::{commission, export_cursor, export_sequence};

const COMMISSION_SEQUENCE: &str = "commissions";

/// 待写入的佣金
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionDraft {
    pub attribution_id: String,
    pub kind: CommissionKind,
    pub earner_id: String,
    pub campaign_id: String,
    pub amount_cents: i64,
    pub rate_applied: String,
    pub status: CommissionStatus,
}

impl SeaOrmStorage {
    /// `(attribution_id, kind)` 唯一：重复调用返回已存在的记录
    pub async fn insert_commission_once<C: ConnectionTrait>(
        conn: &C,
        draft: &CommissionDraft,
    ) -> Result<Commission> {
        let now = Utc::now();
        let model = commission::ActiveModel {
            seq: NotSet,
            id: Set(uuid::Uuid::new_v4().to_string()),
            attribution_id: Set(draft.attribution_id.clone()),
            kind: Set(draft.kind.to_string()),
            earner_id: Set(draft.earner_id.clone()),
            campaign_id: Set(draft.campaign_id.clone()),
            amount_cents: Set(draft.amount_cents),
            rate_applied: Set(draft.rate_applied.clone()),
            status: Set(draft.status.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            export_seq: NotSet,
        };

        commission::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    commission::Column::AttributionId,
                    commission::Column::Kind,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Self::find_commission_by_attribution(conn, &draft.attribution_id, draft.kind)
            .await?
            .ok_or_else(|| {
                EngineError::database_operation(format!(
                    "commission for attribution '{}' vanished after insert",
                    draft.attribution_id
                ))
            })
    }

    pub async fn find_commission_by_attribution<C: ConnectionTrait>(
        conn: &C,
        attribution_id: &str,
        kind: CommissionKind,
    ) -> Result<Option<Commission>> {
        Ok(commission::Entity::find()
            .filter(commission::Column::AttributionId.eq(attribution_id))
            .filter(commission::Column::Kind.eq(kind.to_string()))
            .one(conn)
            .await?
            .map(model_to_commission))
    }

    pub async fn get_commission(&self, commission_id: &str) -> Result<Option<Commission>> {
        Ok(commission::Entity::find()
            .filter(commission::Column::Id.eq(commission_id))
            .one(&self.db)
            .await?
            .map(model_to_commission))
    }

    /// 条件更新：只有 pending 的 accrual 能变为 paid
    pub async fn mark_commission_paid(&self, commission_id: &str) -> Result<Commission> {
        let result = commission::Entity::update_many()
            .col_expr(
                commission::Column::Status,
                Expr::value(CommissionStatus::Paid.to_string()),
            )
            .col_expr(commission::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(commission::Column::Id.eq(commission_id))
            .filter(commission::Column::Kind.eq(CommissionKind::Accrual.to_string()))
            .filter(commission::Column::Status.eq(CommissionStatus::Pending.to_string()))
            .exec(&self.db)
            .await?;

        let current = self.get_commission(commission_id).await?.ok_or_else(|| {
            EngineError::not_found(format!("commission '{}' not found", commission_id))
        })?;

        if result.rows_affected == 0 {
            return Err(EngineError::validation(format!(
                "commission '{}' is a {} in status {} and cannot be marked paid",
                commission_id, current.kind, current.status
            )));
        }
        Ok(current)
    }

    /// 给已提交、尚未编号的记录分配导出位置，返回本次编号的数量
    pub async fn publish_commissions(&self, limit: u64) -> Result<u64> {
        let txn = self.db.begin().await?;

        export_sequence::Entity::insert(export_sequence::ActiveModel {
            name: Set(COMMISSION_SEQUENCE.to_string()),
            value: Set(0),
        })
        .on_conflict(
            OnConflict::column(export_sequence::Column::Name)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        // 先写计数行取得行锁，其他发布者在此排队，之后的读取能看到它们已提交的编号
        export_sequence::Entity::update_many()
            .col_expr(
                export_sequence::Column::Value,
                Expr::col(export_sequence::Column::Value).add(0),
            )
            .filter(export_sequence::Column::Name.eq(COMMISSION_SEQUENCE))
            .exec(&txn)
            .await?;

        let mut next = export_sequence::Entity::find_by_id(COMMISSION_SEQUENCE.to_string())
            .one(&txn)
            .await?
            .map(|m| m.value)
            .unwrap_or(0);

        let pending = commission::Entity::find()
            .filter(commission::Column::ExportSeq.is_null())
            .order_by_asc(commission::Column::Seq)
            .limit(limit)
            .all(&txn)
            .await?;
        if pending.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        for row in &pending {
            next += 1;
            commission::Entity::update_many()
                .col_expr(commission::Column::ExportSeq, Expr::value(next))
                .filter(commission::Column::Seq.eq(row.seq))
                .filter(commission::Column::ExportSeq.is_null())
                .exec(&txn)
                .await?;
        }
        export_sequence::Entity::update_many()
            .col_expr(export_sequence::Column::Value, Expr::value(next))
            .filter(export_sequence::Column::Name.eq(COMMISSION_SEQUENCE))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        debug!("Published {} commissions for export, last position {}", pending.len(), next);
        Ok(pending.len() as u64)
    }

    /// 按导出位置返回游标之后的已发布记录
    pub async fn commissions_after(&self, position: i64, limit: u64) -> Result<Vec<Commission>> {
        Ok(commission::Entity::find()
            .filter(commission::Column::ExportSeq.gt(position))
            .order_by_asc(commission::Column::ExportSeq)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(model_to_commission)
            .collect())
    }

    pub async fn export_cursor(&self, consumer: &str) -> Result<i64> {
        Ok(export_cursor::Entity::find_by_id(consumer.to_string())
            .one(&self.db)
            .await?
            .map(|m| m.position)
            .unwrap_or(0))
    }

    /// 游标只前进不后退；返回推进后的位置
    pub async fn advance_export_cursor(&self, consumer: &str, position: i64) -> Result<i64> {
        let now = Utc::now();
        export_cursor::Entity::insert(export_cursor::ActiveModel {
            consumer: Set(consumer.to_string()),
            position: Set(0),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(export_cursor::Column::Consumer)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;

        export_cursor::Entity::update_many()
            .col_expr(export_cursor::Column::Position, Expr::value(position))
            .col_expr(export_cursor::Column::UpdatedAt, Expr::value(now))
            .filter(export_cursor::Column::Consumer.eq(consumer))
            .filter(Expr::col(export_cursor::Column::Position).lt(position))
            .exec(&self.db)
            .await?;

        self.export_cursor(consumer).await
    }
}
