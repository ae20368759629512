//! AttributionLedger 集成测试
//!
//! 转化幂等、last-touch 回看窗口、风控对归因资格的影响。

mod common;

use chrono::{Duration, Utc};

use commerce_engine::errors::EngineError;
use commerce_engine::services::targeting::SlotContext;
use commerce_engine::services::{
    AdDecision, AdRequest, ConversionOutcome, NoAttributionReason, Resolution,
};
use commerce_engine::storage::{
    Attribution, Commission, CommissionStatus, EventKind, FraudState, ReasonCode,
};

use common::{TestEnv, account, conversion};

const DESTINATION: &str = "https://merchant.example/item/9";

fn expect_attributed(outcome: &ConversionOutcome) -> (&Attribution, &Commission) {
    match outcome {
        ConversionOutcome::Attributed {
            attribution,
            commission,
        } => (attribution, commission),
        other => panic!("expected an attribution, got {:?}", other),
    }
}

// =============================================================================
// 幂等
// =============================================================================

#[tokio::test]
async fn test_replayed_conversion_creates_one_commission() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    env.engine.resolver.resolve("abc123", &account("U2")).await;
    env.flush_events().await;

    let x9 = conversion("X9", "C1", "U2", 5_000);
    let first = env.engine.ledger.record_conversion(&x9).await.unwrap();
    let second = env.engine.ledger.record_conversion(&x9).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.outcome, second.outcome);

    let (attribution, commission) = expect_attributed(&first.outcome);
    assert_eq!(attribution.conversion_id, "X9");
    assert_eq!(attribution.credited_event_kind, EventKind::Click);
    assert_eq!(attribution.credited_actor, "U2");
    assert_eq!(attribution.earner_id, "E1");
    assert_eq!(commission.status, CommissionStatus::Pending);
    // C1 / affiliate：10%
    assert_eq!(commission.amount_cents, 500);

    let batch = env.engine.commissions.export("payout", 100).await.unwrap();
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].id, commission.id);
}

#[tokio::test]
async fn test_no_prior_event_is_recorded_without_attribution() {
    let env = TestEnv::new().await;

    let c = conversion("X10", "C1", "U5", 1_999);
    let first = env.engine.ledger.record_conversion(&c).await.unwrap();
    assert_eq!(
        first.outcome,
        ConversionOutcome::NoAttribution(NoAttributionReason::NoQualifyingEvent)
    );

    // 重放返回同一结果
    let replay = env.engine.ledger.record_conversion(&c).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.outcome, first.outcome);

    let batch = env.engine.commissions.export("payout", 100).await.unwrap();
    assert!(batch.records.is_empty());
}

#[tokio::test]
async fn test_invalid_conversion_rejected() {
    let env = TestEnv::new().await;

    let missing_buyer = conversion("X11", "C1", "  ", 100);
    assert!(matches!(
        env.engine.ledger.record_conversion(&missing_buyer).await,
        Err(EngineError::Validation(_))
    ));

    let negative = conversion("X12", "C1", "U1", -1);
    assert!(matches!(
        env.engine.ledger.record_conversion(&negative).await,
        Err(EngineError::Validation(_))
    ));
}

// =============================================================================
// 回看窗口
// =============================================================================

#[tokio::test]
async fn test_click_outside_window_never_attributes() {
    let env = TestEnv::new().await;
    let window = env.config.attribution.window_days as i64;
    let now = Utc::now();

    env.insert_click("abc123", "C1", "U8", "E1", now - Duration::days(window + 1))
        .await;
    let old = env
        .engine
        .ledger
        .record_conversion(&conversion("X20", "C1", "U8", 5_000))
        .await
        .unwrap();
    assert_eq!(
        old.outcome,
        ConversionOutcome::NoAttribution(NoAttributionReason::NoQualifyingEvent)
    );

    env.insert_click("abc123", "C1", "U9", "E1", now - Duration::days(window - 1))
        .await;
    let recent = env
        .engine
        .ledger
        .record_conversion(&conversion("X21", "C1", "U9", 5_000))
        .await
        .unwrap();
    expect_attributed(&recent.outcome);
}

#[tokio::test]
async fn test_most_recent_touch_wins() {
    let env = TestEnv::new().await;
    let now = Utc::now();

    env.insert_click("first", "C1", "U4", "E1", now - Duration::days(3)).await;
    env.insert_click("second", "C1", "U4", "E2", now - Duration::hours(2)).await;
    // 其他活动的点击不参与
    env.insert_click("other", "C2", "U4", "E3", now - Duration::minutes(1)).await;

    let result = env
        .engine
        .ledger
        .record_conversion(&conversion("X30", "C1", "U4", 2_000))
        .await
        .unwrap();
    let (attribution, _) = expect_attributed(&result.outcome);
    assert_eq!(attribution.earner_id, "E2");
    assert_eq!(attribution.campaign_id, "C1");
}

#[tokio::test]
async fn test_impression_can_be_credited() {
    let env = TestEnv::with_catalog(&format!(
        "{}{}",
        common::BASE_CATALOG,
        r#"
[[creatives]]
id = "cr-c2"
campaign_id = "C2"
bid_cents = 3
status = "active"
created_at = "2026-01-01T00:00:00Z"
payload = { title = "Shoes", click_url = "https://merchant.example/shoes" }

[[creatives.rules]]
kind = "keyword"
terms = ["shoes"]
"#
    ))
    .await;

    let decision = env
        .engine
        .targeting
        .select_ad(&AdRequest {
            viewer_id: "V1".to_string(),
            context_keywords: vec!["shoes".to_string()],
            slot_context: SlotContext {
                thread_id: "t1".to_string(),
                publisher_id: "P1".to_string(),
                ..Default::default()
            },
        })
        .await;
    let served = match decision {
        AdDecision::Fill(served) => served,
        other => panic!("expected a fill, got {:?}", other),
    };
    env.flush_events().await;

    let result = env
        .engine
        .ledger
        .record_conversion(&conversion("X40", "C2", "V1", 10_000))
        .await
        .unwrap();
    let (attribution, commission) = expect_attributed(&result.outcome);
    assert_eq!(attribution.credited_event_id, served.impression_id);
    assert_eq!(attribution.credited_event_kind, EventKind::Impression);
    assert_eq!(attribution.earner_id, "P1");
    // (*, *) 兜底费率
    assert_eq!(commission.amount_cents, 25);
}

// =============================================================================
// 风控
// =============================================================================

#[tokio::test]
async fn test_blocked_click_never_attributes_but_redirects() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    let actor = account("A1");

    for _ in 0..5 {
        let resolution = env.engine.resolver.resolve("abc123", &actor).await;
        assert!(matches!(resolution, Resolution::Resolved { .. }));
    }
    assert_eq!(env.engine.fraud.current("A1").state, FraudState::Blocked);
    env.flush_events().await;

    let result = env
        .engine
        .ledger
        .record_conversion(&conversion("X50", "C1", "A1", 5_000))
        .await
        .unwrap();
    assert_eq!(
        result.outcome,
        ConversionOutcome::NoAttribution(NoAttributionReason::BlockedTouch)
    );
}

#[tokio::test]
async fn test_later_flag_keeps_formed_attribution() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    env.engine.resolver.resolve("abc123", &account("U3")).await;
    env.flush_events().await;

    let c = conversion("X60", "C1", "U3", 5_000);
    let first = env.engine.ledger.record_conversion(&c).await.unwrap();
    expect_attributed(&first.outcome);

    env.engine.fraud.flag("U3", ReasonCode::SelfReferral);
    assert_eq!(env.engine.fraud.current("U3").state, FraudState::Blocked);

    let replay = env.engine.ledger.record_conversion(&c).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.outcome, first.outcome);
}

#[tokio::test]
async fn test_self_referral_is_excluded_and_flagged() {
    let env = TestEnv::new().await;
    env.create_link("self1", DESTINATION, "C1", "E5").await;
    env.engine.resolver.resolve("self1", &account("E5")).await;
    env.flush_events().await;

    let result = env
        .engine
        .ledger
        .record_conversion(&conversion("X70", "C1", "E5", 5_000))
        .await
        .unwrap();
    assert_eq!(
        result.outcome,
        ConversionOutcome::NoAttribution(NoAttributionReason::SelfReferral)
    );

    let flag = env.engine.fraud.get("E5").unwrap();
    assert!(flag.reason_codes.contains(&ReasonCode::SelfReferral));
    assert_eq!(flag.state, FraudState::Blocked);
}
