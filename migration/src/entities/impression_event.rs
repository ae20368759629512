//! Append-only ad fill log

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "impression_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub event_id: String,
    pub creative_id: String,
    pub campaign_id: String,
    pub viewer_id: String,
    pub thread_id: String,
    /// Publisher that owns the slot
    pub earner_id: String,
    /// Relevance score at serve time
    pub score: f64,
    pub fraud_state: String,
    pub fraud_score: i32,
    pub served_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
