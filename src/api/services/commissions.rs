//! 佣金导出与状态变更（打款方调用）

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::api::error_code::ErrorCode;
use crate::api::helpers::{api_result, error_from_engine, error_response, success_response};
use crate::errors::EngineError;
use crate::services::Engine;

const DEFAULT_EXPORT_LIMIT: u64 = 100;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub consumer: String,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub consumer: String,
    pub position: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub consumer: String,
    pub position: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalRequest {
    pub attribution_id: String,
    #[serde(default)]
    pub reason: String,
}

pub struct CommissionService;

impl CommissionService {
    pub async fn export(
        query: web::Query<ExportQuery>,
        engine: web::Data<Arc<Engine>>,
    ) -> HttpResponse {
        let limit = query.limit.unwrap_or(DEFAULT_EXPORT_LIMIT);
        trace!("Commission export for {} (limit {})", query.consumer, limit);
        match engine.commissions.export(&query.consumer, limit).await {
            Ok(batch) => success_response(batch),
            Err(EngineError::Validation(msg)) => error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::ExportInvalidConsumer,
                &msg,
            ),
            Err(e) => error_from_engine(&e),
        }
    }

    pub async fn ack(body: web::Json<AckRequest>, engine: web::Data<Arc<Engine>>) -> HttpResponse {
        let body = body.into_inner();
        match engine.commissions.ack(&body.consumer, body.position).await {
            Ok(position) => success_response(AckResponse {
                consumer: body.consumer,
                position,
            }),
            Err(EngineError::Validation(msg)) => error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::ExportInvalidConsumer,
                &msg,
            ),
            Err(e) => error_from_engine(&e),
        }
    }

    pub async fn get(path: web::Path<String>, engine: web::Data<Arc<Engine>>) -> HttpResponse {
        let id = path.into_inner();
        match engine.commissions.get(&id).await {
            Ok(Some(commission)) => success_response(commission),
            Ok(None) => error_response(
                StatusCode::NOT_FOUND,
                ErrorCode::CommissionNotFound,
                &format!("commission '{}' not found", id),
            ),
            Err(e) => error_from_engine(&e),
        }
    }

    pub async fn mark_paid(
        path: web::Path<String>,
        engine: web::Data<Arc<Engine>>,
    ) -> HttpResponse {
        match engine.commissions.mark_paid(&path.into_inner()).await {
            Ok(commission) => success_response(commission),
            Err(EngineError::NotFound(msg)) => {
                error_response(StatusCode::NOT_FOUND, ErrorCode::CommissionNotFound, &msg)
            }
            Err(EngineError::Validation(msg)) => error_response(
                StatusCode::CONFLICT,
                ErrorCode::CommissionInvalidTransition,
                &msg,
            ),
            Err(e) => error_from_engine(&e),
        }
    }

    pub async fn reverse(
        body: web::Json<ReversalRequest>,
        engine: web::Data<Arc<Engine>>,
    ) -> HttpResponse {
        api_result(
            engine
                .commissions
                .reverse(&body.attribution_id, &body.reason)
                .await,
        )
    }
}

/// 佣金路由 `/commissions`
///
/// - GET /commissions/export?consumer=&limit=
/// - POST /commissions/export/ack
/// - POST /commissions/reversals
/// - GET /commissions/{id}
/// - POST /commissions/{id}/paid
pub fn commission_routes() -> actix_web::Scope {
    web::scope("/commissions")
        .route("/export", web::get().to(CommissionService::export))
        .route("/export/ack", web::post().to(CommissionService::ack))
        .route("/reversals", web::post().to(CommissionService::reverse))
        .route("/{id}/paid", web::post().to(CommissionService::mark_paid))
        .route("/{id}", web::get().to(CommissionService::get))
}
