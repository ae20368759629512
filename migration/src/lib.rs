pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20260301_000001_links_and_events;
mod m20260301_000002_ledger;
mod m20260301_000003_fraud_and_segments;
mod m20260301_000004_export_sequence;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_links_and_events::Migration),
            Box::new(m20260301_000002_ledger::Migration),
            Box::new(m20260301_000003_fraud_and_segments::Migration),
            Box::new(m20260301_000004_export_sequence::Migration),
        ]
    }
}
