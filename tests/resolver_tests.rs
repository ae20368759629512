//! ShortLinkResolver 集成测试
//!
//! 短码 → 跳转目标，缓存命中与未命中结果一致，每次成功解析记录一次点击。

mod common;

use commerce_engine::services::Resolution;
use commerce_engine::storage::FraudState;

use common::{TestEnv, account};

const DESTINATION: &str = "https://merchant.example/item/9";

fn destination_of(resolution: &Resolution) -> Option<&str> {
    match resolution {
        Resolution::Resolved { destination, .. } => Some(destination),
        Resolution::Degraded { destination } => Some(destination),
        _ => None,
    }
}

// =============================================================================
// 基本解析
// =============================================================================

#[tokio::test]
async fn test_resolve_twice_records_two_clicks() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    let actor = account("U7");

    let first = env.engine.resolver.resolve("abc123", &actor).await;
    let second = env.engine.resolver.resolve("abc123", &actor).await;

    for resolution in [&first, &second] {
        match resolution {
            Resolution::Resolved {
                destination,
                campaign_id,
                assessment,
                ..
            } => {
                assert_eq!(destination, DESTINATION);
                assert_eq!(campaign_id, "C1");
                assert_ne!(assessment.state, FraudState::Blocked);
            }
            other => panic!("expected Resolved, got {:?}", other),
        }
    }

    env.flush_events().await;
    let clicks = env.engine.storage.clicks_for_code("abc123").await.unwrap();
    assert_eq!(clicks.len(), 2);
    assert!(clicks.iter().all(|c| c.fraud_state != FraudState::Blocked));
    assert!(clicks.iter().all(|c| c.actor_id == "U7" && c.earner_id == "E1"));
    assert_ne!(clicks[0].event_id, clicks[1].event_id);
}

#[tokio::test]
async fn test_cache_hit_and_miss_agree() {
    let env = TestEnv::new().await;
    env.create_link("promo-1", DESTINATION, "C1", "E1").await;
    let actor = account("U1");

    // 第一次从存储读取并回填缓存
    let from_store = env.engine.resolver.resolve("promo-1", &actor).await;
    let from_cache = env.engine.resolver.resolve("promo-1", &actor).await;
    env.engine.cache.invalidate("promo-1").await;
    let after_invalidate = env.engine.resolver.resolve("promo-1", &actor).await;

    assert_eq!(destination_of(&from_store), Some(DESTINATION));
    assert_eq!(destination_of(&from_cache), Some(DESTINATION));
    assert_eq!(destination_of(&after_invalidate), Some(DESTINATION));
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let env = TestEnv::new().await;
    let actor = account("U1");

    assert_eq!(
        env.engine.resolver.resolve("nope404", &actor).await,
        Resolution::NotFound
    );
    // 非法短码不会访问存储
    assert_eq!(
        env.engine.resolver.resolve("bad/code", &actor).await,
        Resolution::NotFound
    );

    env.flush_events().await;
    assert!(env.engine.storage.clicks_for_code("nope404").await.unwrap().is_empty());
}

/// 另一个进程（CLI 或其他实例）直接写入存储的短码，本实例的过滤器尚未收录
#[tokio::test]
async fn test_link_written_by_another_process_resolves() {
    use commerce_engine::storage::{LinkStore, ShortLink};

    let env = TestEnv::new().await;
    let link = ShortLink {
        code: "ext777".to_string(),
        destination: DESTINATION.to_string(),
        campaign_id: "C1".to_string(),
        earner_id: "E1".to_string(),
        created_at: chrono::Utc::now(),
        expires_at: None,
        active: true,
    };
    env.engine.storage.create(&link).await.unwrap();

    let actor = account("U3");
    let first = env.engine.resolver.resolve("ext777", &actor).await;
    let cached = env.engine.resolver.resolve("ext777", &actor).await;
    assert_eq!(destination_of(&first), Some(DESTINATION));
    assert_eq!(destination_of(&cached), Some(DESTINATION));

    env.flush_events().await;
    assert_eq!(env.engine.storage.clicks_for_code("ext777").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_deactivated_link_is_expired_not_missing() {
    let env = TestEnv::new().await;
    env.create_link("gone1", DESTINATION, "C1", "E1").await;
    let actor = account("U1");

    assert!(destination_of(&env.engine.resolver.resolve("gone1", &actor).await).is_some());
    env.engine.links.deactivate("gone1").await.unwrap();

    assert_eq!(
        env.engine.resolver.resolve("gone1", &actor).await,
        Resolution::Expired
    );

    env.flush_events().await;
    // 只有停用前的那次解析产生点击
    assert_eq!(env.engine.storage.clicks_for_code("gone1").await.unwrap().len(), 1);
}

// =============================================================================
// 风控不影响跳转
// =============================================================================

#[tokio::test]
async fn test_blocked_actor_still_redirected() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    let actor = account("A1");

    let mut states = Vec::new();
    for _ in 0..5 {
        let resolution = env.engine.resolver.resolve("abc123", &actor).await;
        match resolution {
            Resolution::Resolved {
                destination,
                assessment,
                ..
            } => {
                assert_eq!(destination, DESTINATION);
                states.push(assessment.state);
            }
            other => panic!("expected Resolved, got {:?}", other),
        }
    }

    assert_eq!(states.last(), Some(&FraudState::Blocked));
    assert_eq!(states.first(), Some(&FraudState::Clean));

    env.flush_events().await;
    let clicks = env.engine.storage.clicks_for_code("abc123").await.unwrap();
    assert_eq!(clicks.len(), 5);
    assert_eq!(clicks[4].fraud_state, FraudState::Blocked);
}
