//! 短链接与事件日志表
//!
//! - short_links: 短码 → 目标地址 + 活动归属
//! - click_events: 点击日志（只追加）
//! - impression_events: 广告展示日志（只追加）

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ShortLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShortLinks::Code)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ShortLinks::Destination).text().not_null())
                    .col(ColumnDef::new(ShortLinks::CampaignId).string_len(64).not_null())
                    .col(ColumnDef::new(ShortLinks::EarnerId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(ShortLinks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShortLinks::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ShortLinks::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_short_links_campaign")
                    .table(ShortLinks::Table)
                    .col(ShortLinks::CampaignId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::EventId)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ClickEvents::ShortCode).string_len(64).not_null())
                    .col(ColumnDef::new(ClickEvents::CampaignId).string_len(64).not_null())
                    .col(ColumnDef::new(ClickEvents::ActorId).string_len(128).not_null())
                    .col(ColumnDef::new(ClickEvents::DeviceId).string_len(128).null())
                    .col(ColumnDef::new(ClickEvents::IpHash).string_len(32).null())
                    .col(ColumnDef::new(ClickEvents::EarnerId).string_len(64).not_null())
                    .col(ColumnDef::new(ClickEvents::FraudState).string_len(16).not_null())
                    .col(
                        ColumnDef::new(ClickEvents::FraudScore)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 归因窗口查询：actor + campaign + 时间
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_actor_campaign_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ActorId)
                    .col(ClickEvents::CampaignId)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ImpressionEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImpressionEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::EventId)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::CreativeId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::CampaignId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::ViewerId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::ThreadId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::EarnerId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ImpressionEvents::Score).double().not_null())
                    .col(
                        ColumnDef::new(ImpressionEvents::FraudState)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::FraudScore)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ImpressionEvents::ServedAt)
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
                    .name("idx_impression_events_viewer_campaign_time")
                    .table(ImpressionEvents::Table)
                    .col(ImpressionEvents::ViewerId)
                    .col(ImpressionEvents::CampaignId)
                    .col(ImpressionEvents::ServedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImpressionEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShortLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ShortLinks {
    #[sea_orm(iden = "short_links")]
    Table,
    Code,
    Destination,
    CampaignId,
    EarnerId,
    CreatedAt,
    ExpiresAt,
    Active,
}

#[derive(DeriveIden)]
enum ClickEvents {
    #[sea_orm(iden = "click_events")]
    Table,
    Id,
    EventId,
    ShortCode,
    CampaignId,
    ActorId,
    DeviceId,
    IpHash,
    EarnerId,
    FraudState,
    FraudScore,
    ClickedAt,
}

#[derive(DeriveIden)]
enum ImpressionEvents {
    #[sea_orm(iden = "impression_events")]
    Table,
    Id,
    EventId,
    CreativeId,
    CampaignId,
    ViewerId,
    ThreadId,
    EarnerId,
    Score,
    FraudState,
    FraudScore,
    ServedAt,
}
