pub mod attribution;
pub mod campaign_spend;
pub mod click_event;
pub mod commission;
pub mod conversion;
pub mod export_cursor;
pub mod export_sequence;
pub mod fraud_flag;
pub mod impression_event;
pub mod segment;
pub mod segment_generation;
pub mod short_link;
pub mod user_segment;

pub use attribution::Entity as AttributionEntity;
pub use campaign_spend::Entity as CampaignSpendEntity;
pub use click_event::Entity as ClickEventEntity;
pub use commission::Entity as CommissionEntity;
pub use conversion::Entity as ConversionEntity;
pub use export_cursor::Entity as ExportCursorEntity;
pub use export_sequence::Entity as ExportSequenceEntity;
pub use fraud_flag::Entity as FraudFlagEntity;
pub use impression_event::Entity as ImpressionEventEntity;
pub use segment::Entity as SegmentEntity;
pub use segment_generation::Entity as SegmentGenerationEntity;
pub use short_link::Entity as ShortLinkEntity;
pub use user_segment::Entity as UserSegmentEntity;
