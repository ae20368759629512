//! 佣金导出序号
//!
//! `commissions.seq` 在事务中途分配，并发事务的提交顺序可能与它不一致。
//! 导出改用 `export_seq`：只给已提交的记录编号，编号在 `export_sequence` 计数行的行锁下分配。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Commissions::Table)
                    .add_column(ColumnDef::new(Commissions::ExportSeq).big_integer().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_commissions_export_seq")
                    .table(Commissions::Table)
                    .col(Commissions::ExportSeq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExportSequence::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExportSequence::Name)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExportSequence::Value)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExportSequence::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("uq_commissions_export_seq")
                    .table(Commissions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(Commissions::Table)
                    .drop_column(Commissions::ExportSeq)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Commissions {
    #[sea_orm(iden = "commissions")]
    Table,
    ExportSeq,
}

#[derive(DeriveIden)]
enum ExportSequence {
    #[sea_orm(iden = "export_sequence")]
    Table,
    Name,
    Value,
}
