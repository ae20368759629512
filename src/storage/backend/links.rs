use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QuerySelect, sea_query::Expr};
use tracing::{debug, info};

use super::SeaOrmStorage;
use super::converters::{model_to_shortlink, shortlink_to_active_model};
use crate::errors::{EngineError, Result};
use crate::storage::{LinkStore, ShortLink};

use migration::entities::short_link;

#[async_trait]
impl LinkStore for SeaOrmStorage {
    async fn get(&self, code: &str) -> Result<Option<ShortLink>> {
        let model = short_link::Entity::find_by_id(code.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_shortlink))
    }

    async fn create(&self, link: &ShortLink) -> Result<()> {
        let inserted = short_link::Entity::insert(shortlink_to_active_model(link))
            .on_conflict(
                OnConflict::column(short_link::Column::Code)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        if inserted == 0 {
            return Err(EngineError::duplicate_key(format!(
                "short code '{}' already exists",
                link.code
            )));
        }
        debug!("Short link created: {} -> {}", link.code, link.destination);
        Ok(())
    }

    async fn deactivate(&self, code: &str) -> Result<bool> {
        let result = short_link::Entity::update_many()
            .col_expr(short_link::Column::Active, Expr::value(false))
            .filter(short_link::Column::Code.eq(code))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn load_all_codes(&self) -> Result<Vec<String>> {
        let codes: Vec<String> = short_link::Entity::find()
            .select_only()
            .column(short_link::Column::Code)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        info!("Loaded {} short codes for existence filter", codes.len());
        Ok(codes)
    }
}
