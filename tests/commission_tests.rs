//! CommissionCalculator 集成测试
//!
//! 计算确定性、冲正、支付状态流转与导出游标。

mod common;

use commerce_engine::errors::EngineError;
use commerce_engine::services::ConversionOutcome;
use commerce_engine::services::commission::quote;
use commerce_engine::storage::{Attribution, CommissionKind, CommissionStatus};

use common::{TestEnv, account, conversion};

async fn attributed(env: &TestEnv, conversion_id: &str, buyer: &str, value_cents: i64) -> Attribution {
    let code = format!("l-{}", conversion_id);
    env.create_link(&code, "https://merchant.example/item/9", "C1", "E1")
        .await;
    env.engine.resolver.resolve(&code, &account(buyer)).await;
    env.flush_events().await;

    let result = env
        .engine
        .ledger
        .record_conversion(&conversion(conversion_id, "C1", buyer, value_cents))
        .await
        .unwrap();
    match result.outcome {
        ConversionOutcome::Attributed { attribution, .. } => attribution,
        other => panic!("expected an attribution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_calculate_is_deterministic() {
    let env = TestEnv::new().await;
    let attribution = attributed(&env, "X1", "U1", 12_345).await;

    let catalog = env.engine.catalog.snapshot();
    let first_quote = quote(&attribution, &catalog);
    let second_quote = quote(&attribution, &catalog);
    assert_eq!(first_quote, second_quote);
    // 12345 × 10%，四舍五入
    assert_eq!(first_quote.amount_cents, 1_235);

    let a = env.engine.commissions.calculate(&attribution).await.unwrap();
    let b = env.engine.commissions.calculate(&attribution).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.amount_cents, first_quote.amount_cents);
    assert_eq!(a.rate_applied, first_quote.rate_applied);
}

#[tokio::test]
async fn test_reversal_is_a_new_record() {
    let env = TestEnv::new().await;
    let attribution = attributed(&env, "X2", "U2", 5_000).await;

    let reversal = env
        .engine
        .commissions
        .reverse(&attribution.id, "refunded")
        .await
        .unwrap();
    assert_eq!(reversal.kind, CommissionKind::Reversal);
    assert_eq!(reversal.status, CommissionStatus::Reversed);
    assert_eq!(reversal.amount_cents, -500);
    assert!(reversal.rate_applied.contains("refunded"));

    // 原记录不变
    let batch = env.engine.commissions.export("audit", 100).await.unwrap();
    assert_eq!(batch.records.len(), 2);
    let accrual = &batch.records[0];
    assert_eq!(accrual.kind, CommissionKind::Accrual);
    assert_eq!(accrual.status, CommissionStatus::Pending);
    assert_eq!(accrual.amount_cents, 500);

    // 重复冲正返回同一条记录
    let again = env
        .engine
        .commissions
        .reverse(&attribution.id, "refunded")
        .await
        .unwrap();
    assert_eq!(again.id, reversal.id);

    assert!(matches!(
        env.engine.commissions.reverse("no-such-attribution", "x").await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mark_paid_only_from_pending() {
    let env = TestEnv::new().await;
    let attribution = attributed(&env, "X3", "U3", 5_000).await;
    let batch = env.engine.commissions.export("payout", 10).await.unwrap();
    let accrual_id = batch.records[0].id.clone();

    let paid = env.engine.commissions.mark_paid(&accrual_id).await.unwrap();
    assert_eq!(paid.status, CommissionStatus::Paid);

    assert!(matches!(
        env.engine.commissions.mark_paid(&accrual_id).await,
        Err(EngineError::Validation(_))
    ));

    let reversal = env
        .engine
        .commissions
        .reverse(&attribution.id, "chargeback")
        .await
        .unwrap();
    assert!(matches!(
        env.engine.commissions.mark_paid(&reversal.id).await,
        Err(EngineError::Validation(_))
    ));

    assert!(matches!(
        env.engine.commissions.mark_paid("missing").await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_export_cursor_advances_per_consumer() {
    let env = TestEnv::new().await;
    attributed(&env, "X4", "U4", 1_000).await;
    attributed(&env, "X5", "U5", 2_000).await;
    attributed(&env, "X6", "U6", 3_000).await;

    let first = env.engine.commissions.export("payout", 2).await.unwrap();
    assert_eq!(first.records.len(), 2);

    // 未确认前重复导出得到同样的记录
    let again = env.engine.commissions.export("payout", 2).await.unwrap();
    assert_eq!(
        again.records.iter().map(|c| &c.id).collect::<Vec<_>>(),
        first.records.iter().map(|c| &c.id).collect::<Vec<_>>()
    );

    let position = env
        .engine
        .commissions
        .ack("payout", first.next_cursor)
        .await
        .unwrap();
    assert_eq!(position, first.next_cursor);

    let rest = env.engine.commissions.export("payout", 10).await.unwrap();
    assert_eq!(rest.records.len(), 1);
    assert!(rest.records[0].export_position.unwrap() > first.next_cursor);

    // 游标不后退
    let kept = env.engine.commissions.ack("payout", 0).await.unwrap();
    assert_eq!(kept, first.next_cursor);

    // 其他消费者独立
    let other = env.engine.commissions.export("audit", 10).await.unwrap();
    assert_eq!(other.records.len(), 3);

    assert!(matches!(
        env.engine.commissions.export(" ", 10).await,
        Err(EngineError::Validation(_))
    ));
}
