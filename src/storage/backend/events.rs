//! EventSink implementation: batch inserts into the append-only event tables

use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use sea_orm::sea_query::OnConflict;
use tracing::debug;

use super::SeaOrmStorage;
use super::converters::{
    click_to_active_model, impression_to_active_model, model_to_click, model_to_impression,
};
use super::retry;
use crate::errors::Result;
use crate::events::EventSink;
use crate::storage::{ClickEvent, ImpressionEvent};

use migration::entities::{click_event, impression_event};

/// 单条 INSERT 的最大行数（SQLite 变量数上限）
const INSERT_CHUNK: usize = 200;

#[async_trait]
impl EventSink for SeaOrmStorage {
    async fn write_clicks(&self, events: Vec<ClickEvent>) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let total = events.len();
        let db = &self.db;
        for chunk in events.chunks(INSERT_CHUNK) {
            retry::with_retry("write_clicks", self.retry_config, || async {
                let models: Vec<_> = chunk.iter().map(click_to_active_model).collect();
                click_event::Entity::insert_many(models)
                    .on_conflict(
                        OnConflict::column(click_event::Column::EventId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to insert click events: {}", e))?;
        }

        debug!(
            "Click events flushed to {} ({} records)",
            self.backend_name.to_uppercase(),
            total
        );
        Ok(())
    }

    async fn write_impressions(&self, events: Vec<ImpressionEvent>) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let total = events.len();
        let db = &self.db;
        for chunk in events.chunks(INSERT_CHUNK) {
            retry::with_retry("write_impressions", self.retry_config, || async {
                let models: Vec<_> = chunk.iter().map(impression_to_active_model).collect();
                impression_event::Entity::insert_many(models)
                    .on_conflict(
                        OnConflict::column(impression_event::Column::EventId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to insert impression events: {}", e))?;
        }

        debug!(
            "Impression events flushed to {} ({} records)",
            self.backend_name.to_uppercase(),
            total
        );
        Ok(())
    }
}

impl SeaOrmStorage {
    /// 某个短码的全部点击（按写入顺序）
    pub async fn clicks_for_code(&self, code: &str) -> Result<Vec<ClickEvent>> {
        Ok(click_event::Entity::find()
            .filter(click_event::Column::ShortCode.eq(code))
            .order_by_asc(click_event::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(model_to_click)
            .collect())
    }

    pub async fn impressions_for_viewer(&self, viewer_id: &str) -> Result<Vec<ImpressionEvent>> {
        Ok(impression_event::Entity::find()
            .filter(impression_event::Column::ViewerId.eq(viewer_id))
            .order_by_asc(impression_event::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(model_to_impression)
            .collect())
    }
}
