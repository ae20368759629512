//! 风控复核：按状态列出标记、查看单个 actor、手动重置

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::api::error_code::ErrorCode;
use crate::api::helpers::{error_response, success_response};
use crate::services::Engine;
use crate::storage::{FraudFlag, FraudState};

#[derive(Debug, Deserialize)]
pub struct FlagQuery {
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlagList {
    pub total: usize,
    pub flags: Vec<FraudFlag>,
}

pub async fn list_flags(
    query: web::Query<FlagQuery>,
    engine: web::Data<Arc<Engine>>,
) -> HttpResponse {
    let state = match query.state.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<FraudState>() {
            Ok(state) => Some(state),
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    ErrorCode::BadRequest,
                    &format!("unknown state '{}': use clean, suspect or blocked", raw),
                );
            }
        },
        None => None,
    };

    let flags = engine.fraud.list(state);
    success_response(FlagList {
        total: flags.len(),
        flags,
    })
}

pub async fn get_flag(path: web::Path<String>, engine: web::Data<Arc<Engine>>) -> HttpResponse {
    let actor = path.into_inner();
    match engine.fraud.get(&actor) {
        Some(flag) => success_response(flag),
        None => error_response(
            StatusCode::NOT_FOUND,
            ErrorCode::FraudFlagNotFound,
            &format!("no fraud flag for actor '{}'", actor),
        ),
    }
}

pub async fn reset_flag(path: web::Path<String>, engine: web::Data<Arc<Engine>>) -> HttpResponse {
    let actor = path.into_inner();
    if engine.fraud.get(&actor).is_none() {
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorCode::FraudFlagNotFound,
            &format!("no fraud flag for actor '{}'", actor),
        );
    }
    let flag = engine.fraud.reset(&actor);
    info!("Fraud flag for {} reset by operator", actor);
    success_response(flag)
}
