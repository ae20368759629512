//! 短链接跳转
//!
//! 面向终端用户：不暴露内部错误码，失败时只返回简单页面。

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::services::{Engine, Resolution};
use crate::utils::ActorIdentity;
use crate::utils::ip::extract_client_ip;

pub const ACCOUNT_HEADER: &str = "X-Account-Id";

#[derive(Debug, Default, Deserialize)]
struct ActorQuery {
    uid: Option<String>,
}

pub struct RedirectService;

impl RedirectService {
    pub async fn handle_redirect(
        req: HttpRequest,
        path: web::Path<String>,
        engine: web::Data<Arc<Engine>>,
    ) -> HttpResponse {
        let code = path.into_inner();
        let actor = actor_from_request(&req);
        trace!("Resolving {} for actor {}", code, actor.actor_id);

        match engine.resolver.resolve(&code, &actor).await {
            Resolution::Resolved { destination, .. } => Self::found(&destination),
            Resolution::Degraded { destination } => {
                debug!("Serving degraded redirect for {}", code);
                Self::found(&destination)
            }
            Resolution::NotFound => Self::page(StatusCode::NOT_FOUND, "Link not available"),
            Resolution::Expired => Self::page(StatusCode::GONE, "Link not available"),
            Resolution::Unavailable => {
                Self::page(StatusCode::SERVICE_UNAVAILABLE, "Link not available")
            }
        }
    }

    #[inline]
    fn found(destination: &str) -> HttpResponse {
        HttpResponse::Found()
            .insert_header(("Location", destination))
            .insert_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
            .finish()
    }

    #[inline]
    fn page(status: StatusCode, body: &'static str) -> HttpResponse {
        HttpResponse::build(status)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .insert_header(("Cache-Control", "no-store"))
            .body(body)
    }
}

/// 显式账号（header 或 `uid` 参数）优先，否则使用设备指纹
///
/// 账号值不做校验，必须由前置网关鉴权后覆盖客户端传入的值。
pub fn actor_from_request(req: &HttpRequest) -> ActorIdentity {
    let header_account = req
        .headers()
        .get(ACCOUNT_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let account = header_account.or_else(|| {
        web::Query::<ActorQuery>::from_query(req.query_string())
            .ok()
            .and_then(|q| q.into_inner().uid)
    });
    let ip = extract_client_ip(req);
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok());

    ActorIdentity::derive(account.as_deref(), ip.as_deref(), user_agent)
}

pub fn redirect_routes() -> actix_web::Scope {
    web::scope("/resolve").route("/{code}", web::get().to(RedirectService::handle_redirect))
}
