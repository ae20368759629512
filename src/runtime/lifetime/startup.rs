use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::CompositeCache;
use crate::config::{StaticConfig, get_config};
use crate::services::{CatalogService, Engine};
use crate::storage::StorageFactory;

pub struct StartupContext {
    pub engine: Arc<Engine>,
    pub config: Arc<StaticConfig>,
}

/// 准备服务器启动的上下文：存储、缓存、目录快照、全部服务与后台任务
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let config = get_config();

    let storage = StorageFactory::create(&config.database)
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let cache = CompositeCache::from_config(&config.cache)
        .await
        .context("Failed to create cache")?;
    let cache = Arc::new(cache);

    let catalog = CatalogService::load(&config.catalog.path)
        .context("Failed to load campaign catalog")?;
    let catalog = Arc::new(catalog);

    let engine = Engine::assemble(&config, storage, cache, catalog)
        .await
        .context("Failed to assemble engine")?;
    let engine = Arc::new(engine);

    spawn_background_tasks(&engine, &config);

    info!(
        "Pre-startup processing completed in {:?}",
        start_time.elapsed()
    );
    Ok(StartupContext { engine, config })
}

/// 启动后台任务：事件刷盘、目录与人群包刷新、存在性过滤器重建
pub fn spawn_background_tasks(engine: &Arc<Engine>, config: &StaticConfig) {
    let recorder = engine.recorder.clone();
    tokio::spawn(async move {
        recorder.start_background_task().await;
    });

    let catalog = engine.catalog.clone();
    let catalog_interval = Duration::from_secs(config.catalog.refresh_secs.max(1));
    tokio::spawn(catalog.start_refresh_task(catalog_interval));

    let segments = engine.segments.clone();
    let storage = engine.storage.clone();
    let segment_interval = Duration::from_secs(config.segments.refresh_secs.max(1));
    tokio::spawn(segments.start_refresh_task(storage, segment_interval));

    let resolver = engine.resolver.clone();
    let rewarm_interval = Duration::from_secs(config.resolver.rewarm_secs.max(1));
    tokio::spawn(resolver.start_rewarm_task(rewarm_interval));

    debug!(
        "Background tasks started (events every {}s, catalog every {:?}, segments every {:?})",
        config.events.flush_interval_secs, catalog_interval, segment_interval
    );
}
