//! Append-only click log, one row per resolved short link click

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub event_id: String,
    pub short_code: String,
    pub campaign_id: String,
    pub actor_id: String,
    pub device_id: Option<String>,
    pub ip_hash: Option<String>,
    pub earner_id: String,
    /// FraudGuard state of the actor when the click happened
    pub fraud_state: String,
    pub fraud_score: i32,
    pub clicked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
