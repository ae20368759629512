//! 风控标记与人群分段表
//!
//! 分段按代（generation）整体重建：新代以 building 写入，
//! 提交时切换为 active，旧代标记为 retired。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FraudFlags::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FraudFlags::ActorId)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FraudFlags::Score)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FraudFlags::State).string_len(16).not_null())
                    .col(ColumnDef::new(FraudFlags::ReasonCodes).text().not_null())
                    .col(
                        ColumnDef::new(FraudFlags::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SegmentGenerations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SegmentGenerations::Generation)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SegmentGenerations::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SegmentGenerations::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Segments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Segments::SegmentId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Segments::Definition).text().not_null())
                    .col(
                        ColumnDef::new(Segments::MemberCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Segments::Generation).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserSegments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSegments::Generation)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserSegments::UserId).string_len(128).not_null())
                    .col(ColumnDef::new(UserSegments::SegmentIds).text().not_null())
                    .col(
                        ColumnDef::new(UserSegments::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(UserSegments::Generation)
                            .col(UserSegments::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserSegments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Segments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SegmentGenerations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FraudFlags::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FraudFlags {
    #[sea_orm(iden = "fraud_flags")]
    Table,
    ActorId,
    Score,
    State,
    ReasonCodes,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SegmentGenerations {
    #[sea_orm(iden = "segment_generations")]
    Table,
    Generation,
    ComputedAt,
    Status,
}

#[derive(DeriveIden)]
enum Segments {
    #[sea_orm(iden = "segments")]
    Table,
    SegmentId,
    Definition,
    MemberCount,
    Generation,
}

#[derive(DeriveIden)]
enum UserSegments {
    #[sea_orm(iden = "user_segments")]
    Table,
    Generation,
    UserId,
    SegmentIds,
    ComputedAt,
}
