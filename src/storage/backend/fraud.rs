use async_trait::async_trait;
use sea_orm::EntityTrait;
use sea_orm::sea_query::OnConflict;

use super::SeaOrmStorage;
use super::converters::{fraud_flag_to_active_model, model_to_fraud_flag};
use super::retry;
use crate::errors::Result;
use crate::services::fraud::FlagStore;
use crate::storage::FraudFlag;

use migration::entities::fraud_flag;

#[async_trait]
impl FlagStore for SeaOrmStorage {
    async fn save_flag(&self, flag: &FraudFlag) -> Result<()> {
        let db = &self.db;
        retry::with_retry("save_flag", self.retry_config, || async {
            fraud_flag::Entity::insert(fraud_flag_to_active_model(flag))
                .on_conflict(
                    OnConflict::column(fraud_flag::Column::ActorId)
                        .update_columns([
                            fraud_flag::Column::Score,
                            fraud_flag::Column::State,
                            fraud_flag::Column::ReasonCodes,
                            fraud_flag::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await?;
        Ok(())
    }

    async fn load_flags(&self) -> Result<Vec<FraudFlag>> {
        Ok(fraud_flag::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(model_to_fraud_flag)
            .collect())
    }
}
