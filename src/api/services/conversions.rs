//! 转化上报（结算方调用）
//!
//! `Idempotency-Key` 必须等于 `conversionId`；重复上报返回首次的结果。

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

use crate::api::error_code::ErrorCode;
use crate::api::helpers::{decimal_to_cents, error_from_engine, error_response, success_response};
use crate::services::{ConversionOutcome, ConversionResult, Engine, NoAttributionReason};
use crate::storage::{Commission, Conversion, EventKind};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub conversion_id: String,
    pub campaign_id: String,
    pub buyer_id: String,
    /// 十进制金额原文，例如 100.00；JSON 数字或字符串均可
    #[serde(deserialize_with = "decimal_text")]
    pub value: String,
}

/// 保留金额的十进制文本，换算成分时不经过浮点乘法
fn decimal_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionView {
    pub attribution_id: String,
    pub credited_event_id: String,
    pub credited_event_kind: EventKind,
    pub earner_id: String,
    pub window_days: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub conversion_id: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NoAttributionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<AttributionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<Commission>,
    pub replayed: bool,
}

impl From<ConversionResult> for ConversionResponse {
    fn from(result: ConversionResult) -> Self {
        match result.outcome {
            ConversionOutcome::Attributed {
                attribution,
                commission,
            } => Self {
                conversion_id: result.conversion_id,
                outcome: crate::services::attribution::OUTCOME_ATTRIBUTED,
                reason: None,
                attribution: Some(AttributionView {
                    attribution_id: attribution.id,
                    credited_event_id: attribution.credited_event_id,
                    credited_event_kind: attribution.credited_event_kind,
                    earner_id: attribution.earner_id,
                    window_days: attribution.window_days,
                }),
                commission: Some(commission),
                replayed: result.replayed,
            },
            ConversionOutcome::NoAttribution(reason) => Self {
                conversion_id: result.conversion_id,
                outcome: crate::services::attribution::OUTCOME_NO_ATTRIBUTION,
                reason: Some(reason),
                attribution: None,
                commission: None,
                replayed: result.replayed,
            },
        }
    }
}

pub struct ConversionService;

impl ConversionService {
    pub async fn record(
        req: HttpRequest,
        body: web::Json<ConversionRequest>,
        engine: web::Data<Arc<Engine>>,
    ) -> HttpResponse {
        let body = body.into_inner();

        let key = req
            .headers()
            .get(IDEMPOTENCY_HEADER)
            .and_then(|h| h.to_str().ok());
        if key != Some(body.conversion_id.as_str()) {
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::IdempotencyKeyMismatch,
                "Idempotency-Key header must equal conversionId",
            );
        }

        let Some(value_cents) = decimal_to_cents(&body.value) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::ConversionInvalid,
                "value must be a finite decimal amount",
            );
        };

        let conversion = Conversion {
            conversion_id: body.conversion_id,
            campaign_id: body.campaign_id,
            buyer_id: body.buyer_id,
            value_cents,
        };

        match engine.ledger.record_conversion(&conversion).await {
            Ok(result) => success_response(ConversionResponse::from(result)),
            Err(e) => error_from_engine(&e),
        }
    }
}

pub fn conversion_routes() -> actix_web::Scope {
    web::scope("/conversions").route("", web::post().to(ConversionService::record))
}
