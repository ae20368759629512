//! 活动 / 创意 / 费率的只读快照
//!
//! 由管理方维护的 TOML 文件提供，引擎只读。重新加载失败时保留上一份快照。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::services::targeting::TargetingRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub owner_id: String,
    pub status: CampaignStatus,
    pub budget_cents: i64,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// 状态为 active 且未到结束时间（预算另由存储判断）
    pub fn is_serving_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active && self.ends_at.is_none_or(|end| end > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreativeStatus {
    Active,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativePayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub click_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creative {
    pub id: String,
    pub campaign_id: String,
    pub bid_cents: i64,
    pub status: CreativeStatus,
    pub created_at: DateTime<Utc>,
    pub payload: CreativePayload,
    #[serde(default)]
    pub rules: Vec<TargetingRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub min_value_cents: i64,
    pub bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RateRule {
    Flat { amount_cents: i64 },
    Percentage { bps: u32 },
    Tiered { tiers: Vec<Tier> },
}

/// `campaign_id` / `earner_type` 可以是 `*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub campaign_id: String,
    pub earner_type: String,
    pub rule: RateRule,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub creatives: Vec<Creative>,
    #[serde(default)]
    pub rates: Vec<RateEntry>,
    /// earner id → earner type
    #[serde(default)]
    pub earners: HashMap<String, String>,
}

impl Catalog {
    pub fn from_toml(content: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        for creative in &self.creatives {
            if creative.bid_cents < 0 {
                return Err(EngineError::validation(format!(
                    "creative '{}' has a negative bid",
                    creative.id
                )));
            }
            if self.campaign(&creative.campaign_id).is_none() {
                return Err(EngineError::validation(format!(
                    "creative '{}' references unknown campaign '{}'",
                    creative.id, creative.campaign_id
                )));
            }
        }
        for rate in &self.rates {
            if let RateRule::Tiered { tiers } = &rate.rule
                && tiers.is_empty()
            {
                return Err(EngineError::validation(format!(
                    "tiered rate for ({}, {}) has no tiers",
                    rate.campaign_id, rate.earner_type
                )));
            }
        }
        Ok(())
    }

    pub fn campaign(&self, id: &str) -> Option<&Campaign> {
        self.campaigns.iter().find(|c| c.id == id)
    }

    pub fn earner_type(&self, earner_id: &str) -> Option<&str> {
        self.earners.get(earner_id).map(String::as_str)
    }
}

/// 持有当前快照，支持手动与定时重新加载
pub struct CatalogService {
    path: PathBuf,
    current: ArcSwap<Catalog>,
}

impl CatalogService {
    /// 文件不存在时以空快照启动
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let catalog = if path.exists() {
            Self::read(&path)?
        } else {
            warn!(
                "Catalog file {} not found, starting with an empty catalog",
                path.display()
            );
            Catalog::default()
        };
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(catalog),
        })
    }

    pub fn from_catalog(catalog: Catalog) -> Self {
        Self {
            path: PathBuf::new(),
            current: ArcSwap::from_pointee(catalog),
        }
    }

    fn read(path: &Path) -> Result<Catalog> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::file_operation(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        Catalog::from_toml(&content)
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.load_full()
    }

    /// 替换快照（测试 / 管理操作）
    pub fn install(&self, catalog: Catalog) {
        self.current.store(Arc::new(catalog));
    }

    pub fn reload(&self) -> Result<Arc<Catalog>> {
        let catalog = Arc::new(Self::read(&self.path)?);
        self.current.store(Arc::clone(&catalog));
        info!(
            "Catalog reloaded: {} campaigns, {} creatives, {} rates",
            catalog.campaigns.len(),
            catalog.creatives.len(),
            catalog.rates.len()
        );
        Ok(catalog)
    }

    pub async fn start_refresh_task(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            if !self.path.exists() {
                debug!("Catalog file absent, skipping refresh");
                continue;
            }
            if let Err(e) = self.reload() {
                warn!("Catalog refresh failed, keeping previous snapshot: {}", e);
            }
        }
    }
}
