use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::error_code::ErrorCode;
use crate::api::helpers::{error_response, success_response};
use crate::services::Engine;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogReloadResponse {
    pub campaigns: usize,
    pub creatives: usize,
    pub rates: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentReloadResponse {
    pub generation: i64,
    pub changed: bool,
}

/// 失败时保留旧快照
pub async fn reload_catalog(engine: web::Data<Arc<Engine>>) -> HttpResponse {
    match engine.catalog.reload() {
        Ok(catalog) => {
            info!("Catalog reloaded by operator");
            success_response(CatalogReloadResponse {
                campaigns: catalog.campaigns.len(),
                creatives: catalog.creatives.len(),
                rates: catalog.rates.len(),
            })
        }
        Err(e) => {
            warn!("Catalog reload failed: {}", e);
            error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::CatalogReloadFailed,
                e.message(),
            )
        }
    }
}

pub async fn reload_segments(engine: web::Data<Arc<Engine>>) -> HttpResponse {
    match engine.segments.refresh(&engine.storage).await {
        Ok(changed) => success_response(SegmentReloadResponse {
            generation: engine.segments.generation(),
            changed,
        }),
        Err(e) => {
            warn!("Segment reload failed: {}", e);
            error_response(
                e.http_status(),
                ErrorCode::SegmentReloadFailed,
                e.message(),
            )
        }
    }
}
