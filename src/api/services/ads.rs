//! 广告位请求：有广告返回 200 + 素材，没有返回 204

use actix_web::{HttpResponse, web};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::services::{AdDecision, AdRequest, Engine};

pub struct AdsService;

impl AdsService {
    pub async fn serve(body: web::Json<AdRequest>, engine: web::Data<Arc<Engine>>) -> HttpResponse {
        let request = body.into_inner();
        if request.viewer_id.trim().is_empty() {
            // 终端请求不暴露错误细节
            return HttpResponse::NoContent().finish();
        }
        trace!(
            "Ad slot request from viewer {} in thread {}",
            request.viewer_id, request.slot_context.thread_id
        );

        match engine.targeting.select_ad(&request).await {
            AdDecision::Fill(ad) => HttpResponse::Ok()
                .insert_header(("Cache-Control", "no-store"))
                .json(ad),
            AdDecision::NoFill(reason) => {
                debug!("No fill for viewer {}: {}", request.viewer_id, reason);
                HttpResponse::NoContent().finish()
            }
        }
    }
}

pub fn ads_routes() -> actix_web::Scope {
    web::scope("/ads").route("/serve", web::post().to(AdsService::serve))
}
