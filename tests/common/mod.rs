//! 集成测试共用环境
//!
//! 每个测试一个临时 SQLite 数据库，引擎按生产顺序组装。

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use commerce_engine::cache::CompositeCache;
use commerce_engine::config::StaticConfig;
use commerce_engine::services::{Catalog, CatalogService, CreateLinkRequest, Engine};
use commerce_engine::storage::backend::retry::RetryConfig;
use commerce_engine::storage::backend::{SeaOrmStorage, connect_sqlite, run_migrations};
use commerce_engine::storage::{ClickEvent, Conversion, FraudState, ShortLink};
use commerce_engine::utils::actor::ActorIdentity;

/// C1：联盟链接活动；C2：只做广告的活动
pub const BASE_CATALOG: &str = r#"
[[campaigns]]
id = "C1"
owner_id = "M1"
status = "active"
budget_cents = 100000

[[campaigns]]
id = "C2"
owner_id = "M2"
status = "active"
budget_cents = 100000

[[rates]]
campaign_id = "C1"
earner_type = "affiliate"
rule = { type = "percentage", bps = 1000 }

[[rates]]
campaign_id = "*"
earner_type = "*"
rule = { type = "flat", amount_cents = 25 }
"#;

pub struct TestEnv {
    pub engine: Arc<Engine>,
    pub config: StaticConfig,
    _dir: TempDir,
}

/// 测试里放宽时延预算，避免慢速 CI 上偶发超时
pub fn test_config() -> StaticConfig {
    let mut config = StaticConfig::default();
    config.budgets.resolve_ms = 2_000;
    config.budgets.resolve_store_ms = 1_000;
    config.budgets.select_ms = 2_000;
    config.budgets.conversion_ms = 5_000;
    config
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_catalog(BASE_CATALOG).await
    }

    pub async fn with_catalog(catalog: &str) -> Self {
        Self::build(test_config(), catalog).await
    }

    pub async fn build(config: StaticConfig, catalog: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("engine.db").display());
        let db = connect_sqlite(&url).await.expect("connect sqlite");
        run_migrations(&db).await.expect("migrations");
        let storage = Arc::new(SeaOrmStorage::from_connection(
            db,
            "sqlite",
            RetryConfig::default(),
        ));

        let cache = Arc::new(
            CompositeCache::from_config(&config.cache)
                .await
                .expect("cache"),
        );
        let catalog = Arc::new(CatalogService::from_catalog(
            Catalog::from_toml(catalog).expect("catalog"),
        ));
        let engine = Engine::assemble(&config, storage, cache, catalog)
            .await
            .expect("assemble engine");

        Self {
            engine: Arc::new(engine),
            config,
            _dir: dir,
        }
    }

    pub async fn create_link(&self, code: &str, destination: &str, campaign: &str, earner: &str) -> ShortLink {
        self.engine
            .links
            .create(CreateLinkRequest {
                code: Some(code.to_string()),
                destination: destination.to_string(),
                campaign_id: campaign.to_string(),
                earner_id: earner.to_string(),
                expires_at: None,
            })
            .await
            .expect("create link")
    }

    /// 直接写入一条点击（用于构造历史时间点）
    pub async fn insert_click(&self, code: &str, campaign: &str, actor: &str, earner: &str, at: DateTime<Utc>) {
        use commerce_engine::events::EventSink;

        self.engine
            .storage
            .write_clicks(vec![ClickEvent {
                event_id: uuid::Uuid::new_v4().to_string(),
                short_code: code.to_string(),
                campaign_id: campaign.to_string(),
                actor_id: actor.to_string(),
                device_id: None,
                ip_hash: None,
                earner_id: earner.to_string(),
                fraud_state: FraudState::Clean,
                fraud_score: 0,
                clicked_at: at,
            }])
            .await
            .expect("write click");
    }

    pub async fn flush_events(&self) {
        self.engine.recorder.flush().await;
    }
}

pub fn account(id: &str) -> ActorIdentity {
    ActorIdentity::derive(Some(id), Some("203.0.113.9"), Some("test-agent/1.0"))
}

pub fn conversion(id: &str, campaign: &str, buyer: &str, value_cents: i64) -> Conversion {
    Conversion {
        conversion_id: id.to_string(),
        campaign_id: campaign.to_string(),
        buyer_id: buyer.to_string(),
        value_cents,
    }
}
