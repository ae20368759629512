//! 业务服务层
//!
//! HTTP 处理器与 CLI 共用这里的服务。`Engine` 把各组件按依赖顺序组装起来，
//! 后台任务（刷盘、刷新、预热）由运行时负责启动。

pub mod attribution;
pub mod catalog;
pub mod commission;
pub mod fraud;
pub mod health;
pub mod link_service;
pub mod resolver;
pub mod segments;
pub mod targeting;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cache::CompositeCache;
use crate::config::StaticConfig;
use crate::errors::Result;
use crate::events::EventRecorder;
use crate::storage::SeaOrmStorage;

pub use attribution::{AttributionLedger, ConversionOutcome, ConversionResult, NoAttributionReason};
pub use catalog::{Catalog, CatalogService};
pub use commission::CommissionCalculator;
pub use fraud::FraudGuard;
pub use link_service::{CreateLinkRequest, LinkService};
pub use resolver::{Resolution, ShortLinkResolver};
pub use segments::SegmentStore;
pub use targeting::{AdDecision, AdRequest, AdTargetingEngine};

pub struct Engine {
    pub storage: Arc<SeaOrmStorage>,
    pub cache: Arc<CompositeCache>,
    pub catalog: Arc<CatalogService>,
    pub segments: Arc<SegmentStore>,
    pub fraud: Arc<FraudGuard>,
    pub recorder: EventRecorder,
    pub resolver: Arc<ShortLinkResolver>,
    pub targeting: Arc<AdTargetingEngine>,
    pub ledger: Arc<AttributionLedger>,
    pub commissions: Arc<CommissionCalculator>,
    pub links: Arc<LinkService>,
    pub started_at: DateTime<Utc>,
}

impl Engine {
    /// 组装全部服务：加载风控标记、人群包快照，预热存在性过滤器。需要在 tokio 运行时内调用。
    pub async fn assemble(
        config: &StaticConfig,
        storage: Arc<SeaOrmStorage>,
        cache: Arc<CompositeCache>,
        catalog: Arc<CatalogService>,
    ) -> Result<Self> {
        let budgets = &config.budgets;

        let fraud = Arc::new(FraudGuard::with_store(config.fraud.clone(), storage.clone()));
        fraud.load(storage.as_ref()).await?;

        let segments = Arc::new(SegmentStore::new(config.segments.staleness_secs));
        if let Err(e) = segments.refresh(&storage).await {
            warn!("Initial segment load failed, starting with no segments: {}", e);
        }

        let recorder = EventRecorder::new(
            storage.clone(),
            Duration::from_secs(config.events.flush_interval_secs.max(1)),
            config.events.max_buffered,
        )
        .with_max_retained(config.events.max_retained);

        let resolver = Arc::new(ShortLinkResolver::new(
            storage.clone(),
            cache.clone(),
            fraud.clone(),
            recorder.clone(),
            Duration::from_millis(budgets.resolve_ms),
            Duration::from_millis(budgets.resolve_store_ms),
            &config.resolver.default_url,
        ));
        let warmed = resolver.warm_up().await?;
        info!("Resolver ready, {} short codes known", warmed);

        let targeting = Arc::new(AdTargetingEngine::new(
            config.ads.clone(),
            Duration::from_millis(budgets.select_ms),
            catalog.clone(),
            segments.clone(),
            storage.clone(),
            fraud.clone(),
            recorder.clone(),
        ));

        let ledger = Arc::new(AttributionLedger::new(
            storage.clone(),
            catalog.clone(),
            fraud.clone(),
            config.attribution.window_days,
            Duration::from_millis(budgets.conversion_ms),
        ));
        let commissions = Arc::new(CommissionCalculator::new(storage.clone(), catalog.clone()));
        let links = Arc::new(LinkService::new(storage.clone(), Some(cache.clone())));

        Ok(Self {
            storage,
            cache,
            catalog,
            segments,
            fraud,
            recorder,
            resolver,
            targeting,
            ledger,
            commissions,
            links,
            started_at: Utc::now(),
        })
    }
}
