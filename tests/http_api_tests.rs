//! HTTP 接口测试
//!
//! 终端入口（跳转、广告位）、协作方入口（转化、佣金导出）与运营入口的认证和状态码。

mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use serde_json::{Value, json};

use commerce_engine::api;
use commerce_engine::api::error_code::ErrorCode;
use commerce_engine::config::AuthConfig;

use common::TestEnv;

const ADMIN_TOKEN: &str = "admin-secret";
const COLLABORATOR_TOKEN: &str = "checkout-secret";
const DESTINATION: &str = "https://merchant.example/item/9";

fn auth() -> AuthConfig {
    AuthConfig {
        admin_token: ADMIN_TOKEN.to_string(),
        collaborator_token: COLLABORATOR_TOKEN.to_string(),
    }
}

macro_rules! app {
    ($env:expr) => {{
        let auth = auth();
        test::init_service(
            App::new()
                .app_data(web::Data::new($env.engine.clone()))
                .configure(|cfg| api::configure(cfg, &auth)),
        )
        .await
    }};
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

// =============================================================================
// 跳转
// =============================================================================

#[actix_web::test]
async fn test_resolve_redirects_and_reports_missing() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    let app = app!(env);

    let req = TestRequest::get()
        .uri("/resolve/abc123")
        .insert_header(("X-Account-Id", "U2"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get("Location").unwrap(), DESTINATION);

    let req = TestRequest::get().uri("/resolve/unknown1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    env.flush_events().await;
    let clicks = env.engine.storage.clicks_for_code("abc123").await.unwrap();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].actor_id, "U2");
}

#[actix_web::test]
async fn test_deactivated_link_is_gone() {
    let env = TestEnv::new().await;
    env.create_link("old1", DESTINATION, "C1", "E1").await;
    let app = app!(env);

    let req = TestRequest::post()
        .uri("/admin/links/old1/deactivate")
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = TestRequest::get().uri("/resolve/old1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::GONE);
}

// =============================================================================
// 广告位
// =============================================================================

#[actix_web::test]
async fn test_ad_slot_without_creatives_is_no_content() {
    let env = TestEnv::new().await;
    let app = app!(env);

    let req = TestRequest::post()
        .uri("/ads/serve")
        .set_json(json!({
            "viewerId": "V1",
            "contextKeywords": ["hiking"],
            "slotContext": { "threadId": "t1" }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn test_ad_slot_fill_returns_creative() {
    let env = TestEnv::with_catalog(&format!(
        "{}{}",
        common::BASE_CATALOG,
        r#"
[[creatives]]
id = "cr-1"
campaign_id = "C2"
bid_cents = 3
status = "active"
created_at = "2026-01-01T00:00:00Z"
payload = { title = "Boots", click_url = "https://merchant.example/boots" }

[[creatives.rules]]
kind = "keyword"
terms = ["hiking"]
"#
    ))
    .await;
    let app = app!(env);

    let req = TestRequest::post()
        .uri("/ads/serve")
        .set_json(json!({
            "viewerId": "V1",
            "contextKeywords": ["Hiking"],
            "slotContext": { "threadId": "t1", "publisherId": "P1" }
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["creativeId"], "cr-1");
    assert_eq!(body["campaignId"], "C2");
    assert_eq!(body["payload"]["title"], "Boots");
    assert!(body["impressionId"].as_str().is_some());
}

// =============================================================================
// 转化上报
// =============================================================================

fn conversion_body(id: &str) -> Value {
    json!({
        "conversionId": id,
        "campaignId": "C1",
        "buyerId": "U2",
        "value": 50.00
    })
}

#[actix_web::test]
async fn test_conversion_requires_collaborator_token() {
    let env = TestEnv::new().await;
    let app = app!(env);

    let req = TestRequest::post()
        .uri("/conversions")
        .insert_header(("Idempotency-Key", "X9"))
        .set_json(conversion_body("X9"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 运营 token 不能用于协作方入口
    let req = TestRequest::post()
        .uri("/conversions")
        .insert_header(bearer(ADMIN_TOKEN))
        .insert_header(("Idempotency-Key", "X9"))
        .set_json(conversion_body("X9"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_conversion_idempotency_key_must_match() {
    let env = TestEnv::new().await;
    let app = app!(env);

    for key in [None, Some("other")] {
        let mut req = TestRequest::post()
            .uri("/conversions")
            .insert_header(bearer(COLLABORATOR_TOKEN))
            .set_json(conversion_body("X9"));
        if let Some(key) = key {
            req = req.insert_header(("Idempotency-Key", key));
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], ErrorCode::IdempotencyKeyMismatch as i32);
    }
}

#[actix_web::test]
async fn test_conversion_replay_over_http() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    let app = app!(env);

    let req = TestRequest::get()
        .uri("/resolve/abc123?uid=U2")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FOUND);
    env.flush_events().await;

    let mut commission_ids = Vec::new();
    for attempt in 0..2 {
        let req = TestRequest::post()
            .uri("/conversions")
            .insert_header(bearer(COLLABORATOR_TOKEN))
            .insert_header(("Idempotency-Key", "X9"))
            .set_json(conversion_body("X9"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["code"], 0);
        let data = &body["data"];
        assert_eq!(data["outcome"], "attributed");
        assert_eq!(data["replayed"], attempt == 1);
        assert_eq!(data["commission"]["status"], "pending");
        assert_eq!(data["commission"]["amountCents"], 500);
        commission_ids.push(data["commission"]["id"].as_str().unwrap().to_string());
    }
    assert_eq!(commission_ids[0], commission_ids[1]);

    // 导出只看到一条佣金
    let req = TestRequest::get()
        .uri("/commissions/export?consumer=payout")
        .insert_header(bearer(COLLABORATOR_TOKEN))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let records = body["data"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    let next = body["data"]["nextCursor"].as_i64().unwrap();

    let req = TestRequest::post()
        .uri("/commissions/export/ack")
        .insert_header(bearer(COLLABORATOR_TOKEN))
        .set_json(json!({ "consumer": "payout", "position": next }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["position"], next);

    let req = TestRequest::get()
        .uri("/commissions/export?consumer=payout")
        .insert_header(bearer(COLLABORATOR_TOKEN))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["data"]["records"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_conversion_value_as_decimal_text() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    let app = app!(env);

    let req = TestRequest::get()
        .uri("/resolve/abc123?uid=U2")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FOUND);
    env.flush_events().await;

    let mut body = conversion_body("X10");
    body["value"] = json!("fifty");
    let req = TestRequest::post()
        .uri("/conversions")
        .insert_header(bearer(COLLABORATOR_TOKEN))
        .insert_header(("Idempotency-Key", "X10"))
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], ErrorCode::ConversionInvalid as i32);

    let mut body = conversion_body("X10");
    body["value"] = json!("50.00");
    let req = TestRequest::post()
        .uri("/conversions")
        .insert_header(bearer(COLLABORATOR_TOKEN))
        .insert_header(("Idempotency-Key", "X10"))
        .set_json(body)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["outcome"], "attributed");
    assert_eq!(body["data"]["commission"]["amountCents"], 500);
}

#[actix_web::test]
async fn test_conversion_without_prior_click() {
    let env = TestEnv::new().await;
    let app = app!(env);

    let req = TestRequest::post()
        .uri("/conversions")
        .insert_header(bearer(COLLABORATOR_TOKEN))
        .insert_header(("Idempotency-Key", "X100"))
        .set_json(conversion_body("X100"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["outcome"], "no_attribution");
    assert_eq!(body["data"]["reason"], "no_qualifying_event");
    assert!(body["data"].get("commission").is_none());
}

// =============================================================================
// 运营入口
// =============================================================================

#[actix_web::test]
async fn test_admin_link_creation() {
    let env = TestEnv::new().await;
    let app = app!(env);

    let create = |code: &str| {
        TestRequest::post()
            .uri("/admin/links")
            .insert_header(bearer(ADMIN_TOKEN))
            .set_json(json!({
                "code": code,
                "destination": DESTINATION,
                "campaignId": "C1",
                "earnerId": "E1"
            }))
            .to_request()
    };

    let resp = test::call_service(&app, create("fresh1")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(&app, create("fresh1")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], ErrorCode::LinkAlreadyExists as i32);

    // 新建链接立即可解析
    let req = TestRequest::get().uri("/resolve/fresh1").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FOUND);

    let req = TestRequest::post()
        .uri("/admin/links")
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({
            "destination": "ftp://merchant.example/",
            "campaignId": "C1",
            "earnerId": "E1"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], ErrorCode::LinkInvalidUrl as i32);
}

#[actix_web::test]
async fn test_admin_requires_admin_token() {
    let env = TestEnv::new().await;
    let app = app!(env);

    let req = TestRequest::get()
        .uri("/admin/fraud/flags")
        .insert_header(bearer(COLLABORATOR_TOKEN))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_fraud_review_and_reset() {
    let env = TestEnv::new().await;
    env.create_link("abc123", DESTINATION, "C1", "E1").await;
    let app = app!(env);

    for _ in 0..5 {
        let req = TestRequest::get()
            .uri("/resolve/abc123")
            .insert_header(("X-Account-Id", "A1"))
            .to_request();
        // 封禁不影响跳转
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FOUND);
    }

    let req = TestRequest::get()
        .uri("/admin/fraud/flags?state=blocked")
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["flags"][0]["actorId"], "A1");
    let reasons = body["data"]["flags"][0]["reasonCodes"].as_array().unwrap();
    assert!(reasons.iter().any(|r| r == "velocity_excessive"));

    let req = TestRequest::post()
        .uri("/admin/fraud/flags/A1/reset")
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["state"], "clean");

    let req = TestRequest::get()
        .uri("/admin/fraud/flags/nobody")
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// 健康检查
// =============================================================================

#[actix_web::test]
async fn test_health_endpoints() {
    let env = TestEnv::new().await;
    let app = app!(env);

    let req = TestRequest::get().uri("/health/live").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["storage"]["backend"], "sqlite");
    assert_eq!(body["data"]["pipeline"]["droppedEvents"], 0);
}
