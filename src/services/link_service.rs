//! 活动配置阶段的短链接管理：创建与停用
//!
//! HTTP 管理接口与 CLI 共用。链接创建后不可修改，只能停用，从不物理删除。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::CompositeCache;
use crate::errors::{EngineError, Result};
use crate::storage::{LinkStore, ShortLink};
use crate::utils::url_validator::validate_destination;
use crate::utils::{generate_random_code, is_valid_short_code};

pub const GENERATED_CODE_LEN: usize = 7;
pub const MAX_GENERATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    /// 为空时自动生成
    #[serde(default)]
    pub code: Option<String>,
    pub destination: String,
    pub campaign_id: String,
    pub earner_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct LinkService {
    store: Arc<dyn LinkStore>,
    cache: Option<Arc<CompositeCache>>,
}

impl LinkService {
    pub fn new(store: Arc<dyn LinkStore>, cache: Option<Arc<CompositeCache>>) -> Self {
        Self { store, cache }
    }

    pub async fn create(&self, req: CreateLinkRequest) -> Result<ShortLink> {
        let destination = validate_destination(&req.destination)
            .map_err(|e| EngineError::validation(e.to_string()))?;
        if req.campaign_id.trim().is_empty() || req.earner_id.trim().is_empty() {
            return Err(EngineError::validation(
                "campaignId and earnerId are required",
            ));
        }
        let now = Utc::now();
        if let Some(expires_at) = req.expires_at
            && expires_at <= now
        {
            return Err(EngineError::validation("expiresAt must be in the future"));
        }

        let mut link = ShortLink {
            code: String::new(),
            destination: destination.to_string(),
            campaign_id: req.campaign_id,
            earner_id: req.earner_id,
            created_at: now,
            expires_at: req.expires_at,
            active: true,
        };

        match req.code.filter(|c| !c.is_empty()) {
            Some(code) => {
                if !is_valid_short_code(&code) {
                    return Err(EngineError::validation(format!(
                        "invalid short code '{}': use [A-Za-z0-9_-], at most 64 characters",
                        code
                    )));
                }
                link.code = code;
                self.store.create(&link).await?;
            }
            None => self.create_with_generated_code(&mut link).await?,
        }

        if let Some(cache) = &self.cache {
            cache.register_code(&link.code).await;
        }
        info!(
            "Short link created: {} -> {} (campaign {}, earner {})",
            link.code, link.destination, link.campaign_id, link.earner_id
        );
        Ok(link)
    }

    /// base62 随机短码，冲突时重试
    async fn create_with_generated_code(&self, link: &mut ShortLink) -> Result<()> {
        for attempt in 1..=MAX_GENERATE_ATTEMPTS {
            link.code = generate_random_code(GENERATED_CODE_LEN);
            match self.store.create(link).await {
                Ok(()) => return Ok(()),
                Err(EngineError::DuplicateKey(_)) => {
                    warn!(
                        "Generated code {} collided (attempt {}/{})",
                        link.code, attempt, MAX_GENERATE_ATTEMPTS
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::duplicate_key(format!(
            "could not generate a unique code after {} attempts",
            MAX_GENERATE_ATTEMPTS
        )))
    }

    pub async fn deactivate(&self, code: &str) -> Result<()> {
        if !self.store.deactivate(code).await? {
            return Err(EngineError::not_found(format!("short code '{}' not found", code)));
        }
        if let Some(cache) = &self.cache {
            cache.invalidate(code).await;
        }
        info!("Short link deactivated: {}", code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SeaOrmStorage;
    use crate::storage::backend::{connect_sqlite, run_migrations};
    use crate::storage::backend::retry::RetryConfig;
    use tempfile::TempDir;

    async fn service() -> (LinkService, Arc<SeaOrmStorage>, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("links.db").display());
        let db = connect_sqlite(&url).await.unwrap();
        run_migrations(&db).await.unwrap();
        let storage = Arc::new(SeaOrmStorage::from_connection(
            db,
            "sqlite",
            RetryConfig::default(),
        ));
        (LinkService::new(storage.clone(), None), storage, dir)
    }

    fn request(code: Option<&str>) -> CreateLinkRequest {
        CreateLinkRequest {
            code: code.map(str::to_string),
            destination: "https://merchant.example/item/9".into(),
            campaign_id: "C1".into(),
            earner_id: "E1".into(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_with_explicit_code() {
        let (service, storage, _dir) = service().await;
        let link = service.create(request(Some("abc123"))).await.unwrap();
        assert_eq!(link.code, "abc123");
        assert_eq!(storage.get("abc123").await.unwrap(), Some(link));

        let dup = service.create(request(Some("abc123"))).await;
        assert!(matches!(dup, Err(EngineError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn test_generated_code() {
        let (service, _storage, _dir) = service().await;
        let link = service.create(request(None)).await.unwrap();
        assert_eq!(link.code.len(), GENERATED_CODE_LEN);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let (service, _storage, _dir) = service().await;

        let mut bad_url = request(Some("x1"));
        bad_url.destination = "javascript:alert(1)".into();
        assert!(matches!(
            service.create(bad_url).await,
            Err(EngineError::Validation(_))
        ));

        assert!(matches!(
            service.create(request(Some("a/b"))).await,
            Err(EngineError::Validation(_))
        ));

        let mut past = request(Some("x2"));
        past.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        assert!(matches!(
            service.create(past).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivate() {
        let (service, storage, _dir) = service().await;
        service.create(request(Some("abc123"))).await.unwrap();
        service.deactivate("abc123").await.unwrap();
        let stored = storage.get("abc123").await.unwrap().unwrap();
        assert!(!stored.active);

        assert!(matches!(
            service.deactivate("missing").await,
            Err(EngineError::NotFound(_))
        ));
    }
}
