//! ShortLinkResolver：缓存优先的短码解析
//!
//! 缓存命中直接返回；未命中时在 `resolve_store_ms` 内回源存储并回填缓存。
//! 存储失败或超时时依次降级为：宽限期内的旧缓存 → 配置的默认地址 → 不可用。
//! 成功解析后同步询问 FraudGuard，再把点击事件交给 `EventRecorder`，不等待落盘。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument, trace, warn};

use crate::cache::{CacheResult, CompositeCache};
use crate::errors::Result;
use crate::events::EventRecorder;
use crate::services::fraud::{Assessment, FraudGuard, Signal};
use crate::storage::{ClickEvent, EventKind, LinkStore, ShortLink};
use crate::utils::{ActorIdentity, is_valid_short_code};

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        destination: String,
        campaign_id: String,
        click_id: String,
        assessment: Assessment,
    },
    /// 只有目标地址，没有活动追踪
    Degraded { destination: String },
    NotFound,
    /// 已过期或已停用
    Expired,
    /// 存储不可用且没有任何可降级的数据
    Unavailable,
}

/// 不含副作用的查询结果
enum Lookup {
    Link(ShortLink),
    Stale(ShortLink),
    NotFound,
    Unavailable,
}

pub struct ShortLinkResolver {
    store: Arc<dyn LinkStore>,
    cache: Arc<CompositeCache>,
    fraud: Arc<FraudGuard>,
    recorder: EventRecorder,
    total_budget: Duration,
    store_budget: Duration,
    default_url: Option<String>,
    /// 启动预热与定期预热互斥
    warm_lock: tokio::sync::Mutex<()>,
}

impl ShortLinkResolver {
    pub fn new(
        store: Arc<dyn LinkStore>,
        cache: Arc<CompositeCache>,
        fraud: Arc<FraudGuard>,
        recorder: EventRecorder,
        total_budget: Duration,
        store_budget: Duration,
        default_url: &str,
    ) -> Self {
        Self {
            store,
            cache,
            fraud,
            recorder,
            total_budget,
            store_budget: store_budget.min(total_budget),
            default_url: Some(default_url.trim())
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            warm_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[instrument(skip(self, actor), fields(code = %code))]
    pub async fn resolve(&self, code: &str, actor: &ActorIdentity) -> Resolution {
        if !is_valid_short_code(code) {
            return Resolution::NotFound;
        }

        let lookup = match tokio::time::timeout(self.total_budget, self.lookup(code)).await {
            Ok(lookup) => lookup,
            Err(_) => {
                warn!("Resolution of '{}' exceeded {:?}", code, self.total_budget);
                Lookup::Unavailable
            }
        };

        match lookup {
            Lookup::Link(link) => self.evaluate(link, actor),
            Lookup::Stale(link) if link.is_servable_at(Utc::now()) => {
                debug!("Serving stale cache entry for '{}'", code);
                Resolution::Degraded {
                    destination: link.destination,
                }
            }
            Lookup::Stale(_) => Resolution::Expired,
            Lookup::NotFound => Resolution::NotFound,
            Lookup::Unavailable => match &self.default_url {
                Some(url) => Resolution::Degraded {
                    destination: url.clone(),
                },
                None => Resolution::Unavailable,
            },
        }
    }

    async fn lookup(&self, code: &str) -> Lookup {
        let stale = match self.cache.get(code).await {
            CacheResult::Found(link) => {
                trace!("Cache hit for '{}'", code);
                return Lookup::Link(link);
            }
            CacheResult::NotFound => return Lookup::NotFound,
            CacheResult::Stale(link) => Some(link),
            CacheResult::Miss => None,
        };

        match tokio::time::timeout(self.store_budget, self.store.get(code)).await {
            Ok(Ok(Some(link))) => {
                self.cache.insert(link.clone()).await;
                Lookup::Link(link)
            }
            Ok(Ok(None)) => {
                debug!("Short code '{}' not in store", code);
                self.cache.mark_not_found(code).await;
                Lookup::NotFound
            }
            Ok(Err(e)) => {
                warn!("Link store unavailable for '{}': {}", code, e);
                stale.map_or(Lookup::Unavailable, Lookup::Stale)
            }
            Err(_) => {
                warn!(
                    "Link store lookup for '{}' exceeded {:?}",
                    code, self.store_budget
                );
                stale.map_or(Lookup::Unavailable, Lookup::Stale)
            }
        }
    }

    /// 过期 / 停用检查，然后记录点击
    fn evaluate(&self, link: ShortLink, actor: &ActorIdentity) -> Resolution {
        let now = Utc::now();
        if !link.is_servable_at(now) {
            return Resolution::Expired;
        }

        // 风控只决定点击能否参与归因，不影响跳转
        let assessment = self.fraud.assess(
            &actor.actor_id,
            EventKind::Click,
            Signal {
                campaign_id: &link.campaign_id,
                device_id: actor.device_id.as_deref(),
            },
        );

        let click_id = uuid::Uuid::new_v4().to_string();
        self.recorder.record_click(ClickEvent {
            event_id: click_id.clone(),
            short_code: link.code,
            campaign_id: link.campaign_id.clone(),
            actor_id: actor.actor_id.clone(),
            device_id: actor.device_id.clone(),
            ip_hash: actor.ip_hash.clone(),
            earner_id: link.earner_id,
            fraud_state: assessment.state,
            fraud_score: assessment.score,
            clicked_at: now,
        });

        Resolution::Resolved {
            destination: link.destination,
            campaign_id: link.campaign_id,
            click_id,
            assessment,
        }
    }

    /// 用存储中的全部短码重建存在性过滤器
    pub async fn warm_up(&self) -> Result<usize> {
        let _guard = self.warm_lock.lock().await;
        // 先开始缓冲再读快照，读取期间本实例新建的短码不会丢失
        self.cache.begin_warm_up().await;
        let codes = match self.store.load_all_codes().await {
            Ok(codes) => codes,
            Err(e) => {
                self.cache.abort_warm_up().await;
                return Err(e);
            }
        };
        self.cache.finish_warm_up(&codes).await?;
        Ok(codes.len())
    }

    /// 定期重建过滤器；未收录的短码照常回源，这里只是让过滤器跟上存储
    pub async fn start_rewarm_task(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = self.warm_up().await {
                warn!("Existence filter refresh failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::existence_filter::BloomExistenceFilter;
    use crate::cache::negative_cache::MokaNegativeCache;
    use crate::cache::object_cache::{EntryLifetime, MokaObjectCache};
    use crate::config::FraudConfig;
    use crate::errors::EngineError;
    use crate::events::EventSink;
    use crate::storage::{FraudState, ImpressionEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryLinks {
        links: Mutex<HashMap<String, ShortLink>>,
        down: AtomicBool,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl LinkStore for MemoryLinks {
        async fn get(&self, code: &str) -> Result<Option<ShortLink>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(EngineError::store_unavailable("connection refused"));
            }
            Ok(self.links.lock().get(code).cloned())
        }

        async fn create(&self, link: &ShortLink) -> Result<()> {
            self.links.lock().insert(link.code.clone(), link.clone());
            Ok(())
        }

        async fn deactivate(&self, code: &str) -> Result<bool> {
            Ok(self
                .links
                .lock()
                .get_mut(code)
                .map(|l| l.active = false)
                .is_some())
        }

        async fn load_all_codes(&self) -> Result<Vec<String>> {
            Ok(self.links.lock().keys().cloned().collect())
        }
    }

    #[derive(Default)]
    struct NullSink;

    #[async_trait]
    impl EventSink for NullSink {
        async fn write_clicks(&self, _events: Vec<ClickEvent>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn write_impressions(&self, _events: Vec<ImpressionEvent>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn link(code: &str) -> ShortLink {
        ShortLink {
            code: code.to_string(),
            destination: "https://merchant.example/item/9".into(),
            campaign_id: "C1".into(),
            earner_id: "E1".into(),
            created_at: Utc::now(),
            expires_at: None,
            active: true,
        }
    }

    fn cache(fresh_secs: u64) -> Arc<CompositeCache> {
        Arc::new(CompositeCache::new(
            Arc::new(BloomExistenceFilter::new(0.001).unwrap()),
            Arc::new(MokaNegativeCache::new(100, 60)),
            Arc::new(MokaObjectCache::new(
                100,
                EntryLifetime::new(fresh_secs, 600),
            )),
            0.001,
        ))
    }

    async fn build_resolver(
        store: Arc<MemoryLinks>,
        cache: Arc<CompositeCache>,
        default_url: &str,
    ) -> (ShortLinkResolver, EventRecorder) {
        let recorder = EventRecorder::new(Arc::new(NullSink), Duration::from_secs(60), 10_000);
        let resolver = ShortLinkResolver::new(
            store,
            cache,
            Arc::new(FraudGuard::new(FraudConfig::default())),
            recorder.clone(),
            Duration::from_millis(200),
            Duration::from_millis(100),
            default_url,
        );
        resolver.warm_up().await.unwrap();
        (resolver, recorder)
    }

    fn visitor() -> ActorIdentity {
        ActorIdentity::derive(None, Some("198.51.100.7"), Some("test-agent"))
    }

    #[tokio::test]
    async fn test_hit_and_miss_agree() {
        let store = Arc::new(MemoryLinks::default());
        store.create(&link("abc123")).await.unwrap();
        let (resolver, recorder) = build_resolver(Arc::clone(&store), cache(60), "").await;

        let first = resolver.resolve("abc123", &visitor()).await;
        let second = resolver.resolve("abc123", &visitor()).await;
        for outcome in [&first, &second] {
            match outcome {
                Resolution::Resolved {
                    destination,
                    campaign_id,
                    assessment,
                    ..
                } => {
                    assert_eq!(destination, "https://merchant.example/item/9");
                    assert_eq!(campaign_id, "C1");
                    assert_eq!(assessment.state, FraudState::Clean);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        // 第二次来自缓存
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.buffered().0, 2);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_codes() {
        let store = Arc::new(MemoryLinks::default());
        let (resolver, recorder) = build_resolver(Arc::clone(&store), cache(60), "").await;

        assert_eq!(resolver.resolve("nope", &visitor()).await, Resolution::NotFound);
        assert_eq!(resolver.resolve("../x", &visitor()).await, Resolution::NotFound);
        // 非法短码不访问存储；未知短码回源一次
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        // 第二次由负缓存拦截
        assert_eq!(resolver.resolve("nope", &visitor()).await, Resolution::NotFound);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.buffered().0, 0);
    }

    #[tokio::test]
    async fn test_code_created_elsewhere_resolves_before_rewarm() {
        let store = Arc::new(MemoryLinks::default());
        let (resolver, _) = build_resolver(Arc::clone(&store), cache(60), "").await;

        // 预热之后由其他进程写入，过滤器里没有这个短码
        store.create(&link("ext777")).await.unwrap();
        match resolver.resolve("ext777", &visitor()).await {
            Resolution::Resolved { destination, .. } => {
                assert_eq!(destination, "https://merchant.example/item/9")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_and_deactivated() {
        let store = Arc::new(MemoryLinks::default());
        let mut expired = link("old");
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.create(&expired).await.unwrap();
        store.create(&link("off")).await.unwrap();
        store.deactivate("off").await.unwrap();

        let (resolver, recorder) = build_resolver(store, cache(60), "").await;
        assert_eq!(resolver.resolve("old", &visitor()).await, Resolution::Expired);
        assert_eq!(resolver.resolve("off", &visitor()).await, Resolution::Expired);
        assert_eq!(recorder.buffered().0, 0);
    }

    #[tokio::test]
    async fn test_store_down_serves_stale_entry() {
        let store = Arc::new(MemoryLinks::default());
        store.create(&link("abc123")).await.unwrap();
        // fresh 为 0：回填后立即变成宽限期内的旧值
        let (resolver, recorder) = build_resolver(Arc::clone(&store), cache(0), "").await;

        assert!(matches!(
            resolver.resolve("abc123", &visitor()).await,
            Resolution::Resolved { .. }
        ));

        store.down.store(true, Ordering::SeqCst);
        assert_eq!(
            resolver.resolve("abc123", &visitor()).await,
            Resolution::Degraded {
                destination: "https://merchant.example/item/9".into()
            }
        );
        // 降级结果不产生点击
        assert_eq!(recorder.buffered().0, 1);
    }

    #[tokio::test]
    async fn test_store_down_without_cache() {
        let store = Arc::new(MemoryLinks::default());
        store.create(&link("abc123")).await.unwrap();

        let (resolver, _) = build_resolver(Arc::clone(&store), cache(60), "").await;
        store.down.store(true, Ordering::SeqCst);
        assert_eq!(resolver.resolve("abc123", &visitor()).await, Resolution::Unavailable);

        let (fallback, _) =
            build_resolver(Arc::clone(&store), cache(60), "https://merchant.example/").await;
        assert_eq!(
            fallback.resolve("abc123", &visitor()).await,
            Resolution::Degraded {
                destination: "https://merchant.example/".into()
            }
        );
    }
}
