//! 人群包分代存储
//!
//! 每次重建在一个事务内写完整的新一代数据，再把新一代置为 active、旧的置为 retired。
//! 读取方只读 active 代，不会看到半成品。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, sea_query::Expr,
};
use tracing::{info, warn};

use super::SeaOrmStorage;
use crate::errors::Result;
use crate::storage::SegmentDefinition;

use migration::entities::{segment, segment_generation, user_segment};

const STATUS_BUILDING: &str = "building";
const STATUS_ACTIVE: &str = "active";
const STATUS_RETIRED: &str = "retired";

const INSERT_CHUNK: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentGenerationInfo {
    pub generation: i64,
    pub computed_at: DateTime<Utc>,
}

impl SeaOrmStorage {
    /// 写入一整代人群包并切换为 active，返回新的代号
    pub async fn rebuild_segments(&self, definitions: &[SegmentDefinition]) -> Result<i64> {
        let computed_at = Utc::now();
        let txn = self.db.begin().await?;

        let latest: Option<i64> = segment_generation::Entity::find()
            .select_only()
            .column(segment_generation::Column::Generation)
            .order_by_desc(segment_generation::Column::Generation)
            .into_tuple::<i64>()
            .one(&txn)
            .await?;
        let generation = latest.unwrap_or(0) + 1;

        segment_generation::Entity::insert(segment_generation::ActiveModel {
            generation: Set(generation),
            computed_at: Set(computed_at),
            status: Set(STATUS_BUILDING.to_string()),
        })
        .exec_without_returning(&txn)
        .await?;

        // user -> segments
        let mut memberships: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for def in definitions {
            let members: BTreeSet<&str> = def.members.iter().map(String::as_str).collect();
            for member in &members {
                memberships.entry(member).or_default().insert(def.id.as_str());
            }

            segment::Entity::insert(segment::ActiveModel {
                segment_id: Set(def.id.clone()),
                definition: Set(def.definition.clone()),
                member_count: Set(members.len() as i64),
                generation: Set(generation),
            })
            .on_conflict(
                OnConflict::column(segment::Column::SegmentId)
                    .update_columns([
                        segment::Column::Definition,
                        segment::Column::MemberCount,
                        segment::Column::Generation,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        }

        let rows: Vec<user_segment::ActiveModel> = memberships
            .iter()
            .map(|(user, segs)| {
                let ids: Vec<&str> = segs.iter().copied().collect();
                user_segment::ActiveModel {
                    generation: Set(generation),
                    user_id: Set(user.to_string()),
                    segment_ids: Set(serde_json::to_string(&ids).unwrap_or_else(|_| "[]".into())),
                    computed_at: Set(computed_at),
                }
            })
            .collect();
        let user_count = rows.len();
        for chunk in rows.chunks(INSERT_CHUNK) {
            user_segment::Entity::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await?;
        }

        // 上一代 active 降为 retired，只保留一代旧数据
        segment_generation::Entity::update_many()
            .col_expr(
                segment_generation::Column::Status,
                Expr::value(STATUS_RETIRED),
            )
            .filter(segment_generation::Column::Status.eq(STATUS_ACTIVE))
            .exec(&txn)
            .await?;
        segment_generation::Entity::update_many()
            .col_expr(
                segment_generation::Column::Status,
                Expr::value(STATUS_ACTIVE),
            )
            .filter(segment_generation::Column::Generation.eq(generation))
            .exec(&txn)
            .await?;
        user_segment::Entity::delete_many()
            .filter(user_segment::Column::Generation.lt(generation - 1))
            .exec(&txn)
            .await?;
        segment::Entity::delete_many()
            .filter(segment::Column::Generation.lt(generation))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        info!(
            "Segment generation {} activated ({} segments, {} users)",
            generation,
            definitions.len(),
            user_count
        );
        Ok(generation)
    }

    /// 读取当前 active 代的全部成员关系
    pub async fn load_active_segments(
        &self,
    ) -> Result<Option<(SegmentGenerationInfo, HashMap<String, BTreeSet<String>>)>> {
        let active = segment_generation::Entity::find()
            .filter(segment_generation::Column::Status.eq(STATUS_ACTIVE))
            .order_by_desc(segment_generation::Column::Generation)
            .one(&self.db)
            .await?;
        let Some(active) = active else {
            return Ok(None);
        };

        let rows = user_segment::Entity::find()
            .filter(user_segment::Column::Generation.eq(active.generation))
            .all(&self.db)
            .await?;

        let mut memberships = HashMap::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<BTreeSet<String>>(&row.segment_ids) {
                Ok(ids) => {
                    memberships.insert(row.user_id, ids);
                }
                Err(e) => warn!("Skipping malformed segment row for {}: {}", row.user_id, e),
            }
        }

        Ok(Some((
            SegmentGenerationInfo {
                generation: active.generation,
                computed_at: active.computed_at,
            },
            memberships,
        )))
    }
}
