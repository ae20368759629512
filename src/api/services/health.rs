use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use std::sync::Arc;
use tracing::{info, trace};

use crate::api::error_code::ErrorCode;
use crate::api::helpers::json_response;
use crate::services::{Engine, health};

pub struct HealthService;

impl HealthService {
    pub async fn health_check(engine: web::Data<Arc<Engine>>) -> HttpResponse {
        trace!("Received health check request");
        let report = health::check(&engine).await;
        let healthy = report.is_healthy();

        info!(
            "Health check completed in {}ms, status: {}",
            report.response_time_ms, report.status
        );

        if healthy {
            json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(report))
        } else {
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ServiceUnavailable,
                "Service Unavailable",
                Some(report),
            )
        }
    }

    /// 就绪检查：存储可达才算就绪
    pub async fn readiness_check(engine: web::Data<Arc<Engine>>) -> HttpResponse {
        trace!("Received readiness check request");
        match engine.storage.ping().await {
            Ok(()) => HttpResponse::Ok()
                .append_header(("Content-Type", "text/plain"))
                .body("OK"),
            Err(_) => HttpResponse::ServiceUnavailable()
                .append_header(("Content-Type", "text/plain"))
                .body("Not Ready"),
        }
    }

    // 活跃性检查
    pub async fn liveness_check() -> HttpResponse {
        trace!("Received liveness check request");
        HttpResponse::NoContent().finish()
    }
}

/// Health 路由配置
pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
        .route("/ready", web::get().to(HealthService::readiness_check))
        .route("/ready", web::head().to(HealthService::readiness_check))
        .route("/live", web::get().to(HealthService::liveness_check))
        .route("/live", web::head().to(HealthService::liveness_check))
}
