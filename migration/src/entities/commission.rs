//! Commission records. `seq` is the insertion key; `export_seq` is assigned
//! after commit and is the export cursor position.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "commissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub seq: i64,
    #[sea_orm(unique)]
    pub id: String,
    pub attribution_id: String,
    /// "accrual" or "reversal"; unique together with attribution_id
    pub kind: String,
    pub earner_id: String,
    pub campaign_id: String,
    pub amount_cents: i64,
    pub rate_applied: String,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    /// None until the row is published for export
    pub export_seq: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
