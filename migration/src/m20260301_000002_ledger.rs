//! 归因账本相关表
//!
//! 唯一约束是并发安全的真正来源：
//! - conversions.conversion_id（主键）
//! - attributions.conversion_id
//! - commissions(attribution_id, kind)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversions::ConversionId)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Conversions::CampaignId).string_len(64).not_null())
                    .col(ColumnDef::new(Conversions::BuyerId).string_len(128).not_null())
                    .col(ColumnDef::new(Conversions::ValueCents).big_integer().not_null())
                    .col(
                        ColumnDef::new(Conversions::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversions::Outcome).string_len(32).not_null())
                    .col(ColumnDef::new(Conversions::Reason).string_len(64).null())
                    .col(ColumnDef::new(Conversions::AttributionId).string_len(36).null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversions_buyer")
                    .table(Conversions::Table)
                    .col(Conversions::BuyerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Attributions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Attributions::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Attributions::ConversionId)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Attributions::CreditedEventId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Attributions::CreditedEventKind)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Attributions::CreditedActor)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Attributions::EarnerId).string_len(64).not_null())
                    .col(ColumnDef::new(Attributions::CampaignId).string_len(64).not_null())
                    .col(ColumnDef::new(Attributions::ValueCents).big_integer().not_null())
                    .col(ColumnDef::new(Attributions::WindowDays).integer().not_null())
                    .col(
                        ColumnDef::new(Attributions::AttributedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Commissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Commissions::Seq)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Commissions::Id)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Commissions::AttributionId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Commissions::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(Commissions::EarnerId).string_len(64).not_null())
                    .col(ColumnDef::new(Commissions::CampaignId).string_len(64).not_null())
                    .col(ColumnDef::new(Commissions::AmountCents).big_integer().not_null())
                    .col(ColumnDef::new(Commissions::RateApplied).string_len(128).not_null())
                    .col(ColumnDef::new(Commissions::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Commissions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Commissions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_commissions_attribution_kind")
                    .table(Commissions::Table)
                    .col(Commissions::AttributionId)
                    .col(Commissions::Kind)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CampaignSpend::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignSpend::CampaignId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CampaignSpend::SpentCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CampaignSpend::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CampaignSpend::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExportCursors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExportCursors::Consumer)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExportCursors::Position)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ExportCursors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExportCursors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CampaignSpend::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("uq_commissions_attribution_kind")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Commissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Attributions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Conversions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Conversions {
    #[sea_orm(iden = "conversions")]
    Table,
    ConversionId,
    CampaignId,
    BuyerId,
    ValueCents,
    ReceivedAt,
    Outcome,
    Reason,
    AttributionId,
}

#[derive(DeriveIden)]
enum Attributions {
    #[sea_orm(iden = "attributions")]
    Table,
    Id,
    ConversionId,
    CreditedEventId,
    CreditedEventKind,
    CreditedActor,
    EarnerId,
    CampaignId,
    ValueCents,
    WindowDays,
    AttributedAt,
}

#[derive(DeriveIden)]
enum Commissions {
    #[sea_orm(iden = "commissions")]
    Table,
    Seq,
    Id,
    AttributionId,
    Kind,
    EarnerId,
    CampaignId,
    AmountCents,
    RateApplied,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CampaignSpend {
    #[sea_orm(iden = "campaign_spend")]
    Table,
    CampaignId,
    SpentCents,
    Version,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ExportCursors {
    #[sea_orm(iden = "export_cursors")]
    Table,
    Consumer,
    Position,
    UpdatedAt,
}
