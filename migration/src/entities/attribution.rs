use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "attributions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub conversion_id: String,
    pub credited_event_id: String,
    /// "click" or "impression"
    pub credited_event_kind: String,
    pub credited_actor: String,
    pub earner_id: String,
    pub campaign_id: String,
    pub value_cents: i64,
    pub window_days: i32,
    pub attributed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
