//! 活动配置阶段的短链接创建与停用

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::api::error_code::ErrorCode;
use crate::api::helpers::{error_from_engine, error_response, json_response, success_response};
use crate::errors::EngineError;
use crate::services::{CreateLinkRequest, Engine};
use crate::utils::url_validator::validate_destination;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateResponse {
    pub code: String,
    pub active: bool,
}

pub async fn create_link(
    body: web::Json<CreateLinkRequest>,
    engine: web::Data<Arc<Engine>>,
) -> HttpResponse {
    let req = body.into_inner();

    // 先给出具体的错误码，完整校验仍由 LinkService 负责
    if let Err(e) = validate_destination(&req.destination) {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::LinkInvalidUrl,
            &e.to_string(),
        );
    }
    if req.expires_at.is_some_and(|t| t <= Utc::now()) {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::LinkInvalidExpireTime,
            "expiresAt must be in the future",
        );
    }

    match engine.links.create(req).await {
        Ok(link) => json_response(StatusCode::CREATED, ErrorCode::Success, "Created", Some(link)),
        Err(EngineError::DuplicateKey(msg)) => {
            error_response(StatusCode::CONFLICT, ErrorCode::LinkAlreadyExists, &msg)
        }
        Err(e) => error_from_engine(&e),
    }
}

pub async fn deactivate_link(
    path: web::Path<String>,
    engine: web::Data<Arc<Engine>>,
) -> HttpResponse {
    let code = path.into_inner();
    match engine.links.deactivate(&code).await {
        Ok(()) => success_response(DeactivateResponse {
            code,
            active: false,
        }),
        Err(EngineError::NotFound(msg)) => {
            error_response(StatusCode::NOT_FOUND, ErrorCode::LinkNotFound, &msg)
        }
        Err(e) => error_from_engine(&e),
    }
}
