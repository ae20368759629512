//! Admin API 路由配置

use actix_web::web;

use super::fraud::{get_flag, list_flags, reset_flag};
use super::links::{create_link, deactivate_link};
use super::reload::{reload_catalog, reload_segments};

/// 链接管理路由 `/links`
pub fn links_routes() -> actix_web::Scope {
    web::scope("/links")
        .route("", web::post().to(create_link))
        .route("/{code}/deactivate", web::post().to(deactivate_link))
}

/// 风控复核路由 `/fraud/flags`
pub fn fraud_routes() -> actix_web::Scope {
    web::scope("/fraud/flags")
        .route("", web::get().to(list_flags))
        .route("/{actor}/reset", web::post().to(reset_flag))
        .route("/{actor}", web::get().to(get_flag))
}

/// 挂在 `/admin` 下的全部路由
pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(links_routes())
        .service(fraud_routes())
        // 只读快照刷新
        .route("/catalog/reload", web::post().to(reload_catalog))
        .route("/segments/reload", web::post().to(reload_segments));
}
