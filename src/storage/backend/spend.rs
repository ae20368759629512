//! 活动预算计数器
//!
//! `campaign_spend` 是带版本号的计数器，扣费用一条条件 UPDATE 完成“加并校验”。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, ExprTrait, QueryFilter, sea_query::Expr,
};
use tracing::{trace, warn};

use super::SeaOrmStorage;
use crate::errors::Result;
use crate::services::targeting::SpendLedger;

use migration::entities::campaign_spend;

#[async_trait]
impl SpendLedger for SeaOrmStorage {
    async fn spent(&self, campaign_ids: &[String]) -> Result<HashMap<String, i64>> {
        if campaign_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = campaign_spend::Entity::find()
            .filter(campaign_spend::Column::CampaignId.is_in(campaign_ids.iter().cloned()))
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.campaign_id, row.spent_cents))
            .collect())
    }

    async fn try_charge(
        &self,
        campaign_id: &str,
        amount_cents: i64,
        budget_cents: i64,
    ) -> Result<bool> {
        let now = Utc::now();
        campaign_spend::Entity::insert(campaign_spend::ActiveModel {
            campaign_id: Set(campaign_id.to_string()),
            spent_cents: Set(0),
            version: Set(0),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(campaign_spend::Column::CampaignId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;

        let result = campaign_spend::Entity::update_many()
            .col_expr(
                campaign_spend::Column::SpentCents,
                Expr::col(campaign_spend::Column::SpentCents).add(amount_cents),
            )
            .col_expr(
                campaign_spend::Column::Version,
                Expr::col(campaign_spend::Column::Version).add(1),
            )
            .col_expr(campaign_spend::Column::UpdatedAt, Expr::value(now))
            .filter(campaign_spend::Column::CampaignId.eq(campaign_id))
            .filter(
                Expr::col(campaign_spend::Column::SpentCents)
                    .add(amount_cents)
                    .lte(budget_cents),
            )
            .exec(&self.db)
            .await?;

        let charged = result.rows_affected == 1;
        trace!(
            "Budget charge {} cents on {}: {}",
            amount_cents,
            campaign_id,
            if charged { "accepted" } else { "rejected" }
        );
        Ok(charged)
    }

    async fn refund(&self, campaign_id: &str, amount_cents: i64) -> Result<()> {
        let result = campaign_spend::Entity::update_many()
            .col_expr(
                campaign_spend::Column::SpentCents,
                Expr::col(campaign_spend::Column::SpentCents).sub(amount_cents),
            )
            .col_expr(
                campaign_spend::Column::Version,
                Expr::col(campaign_spend::Column::Version).add(1),
            )
            .col_expr(campaign_spend::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(campaign_spend::Column::CampaignId.eq(campaign_id))
            .filter(campaign_spend::Column::SpentCents.gte(amount_cents))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                "Refund of {} cents on {} matched no spend row",
                amount_cents, campaign_id
            );
        } else {
            trace!("Refunded {} cents on {}", amount_cents, campaign_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::retry::RetryConfig;
    use crate::storage::backend::{connect_sqlite, run_migrations};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_refund_returns_budget() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("spend.db").display());
        let db = connect_sqlite(&url).await.unwrap();
        run_migrations(&db).await.unwrap();
        let storage = SeaOrmStorage::from_connection(db, "sqlite", RetryConfig::default());

        assert!(storage.try_charge("C1", 60, 100).await.unwrap());
        assert!(!storage.try_charge("C1", 60, 100).await.unwrap());

        storage.refund("C1", 60).await.unwrap();
        assert_eq!(storage.spent(&["C1".to_string()]).await.unwrap()["C1"], 0);
        assert!(storage.try_charge("C1", 60, 100).await.unwrap());
    }
}
