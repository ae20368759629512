//! Conversion intake, keyed by the collaborator's idempotency key

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "conversions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub conversion_id: String,
    pub campaign_id: String,
    pub buyer_id: String,
    pub value_cents: i64,
    pub received_at: DateTimeUtc,
    /// "pending" while the claiming transaction runs, then "attributed" / "no_attribution"
    pub outcome: String,
    pub reason: Option<String>,
    pub attribution_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
