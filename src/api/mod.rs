//! HTTP 接口
//!
//! 终端用户入口（跳转、广告位）不需要认证；协作方与运营入口分别使用各自的 Bearer token。

pub mod error_code;
pub mod helpers;
pub mod middleware;
pub mod services;
pub mod types;

use actix_web::http::StatusCode;
use actix_web::{error, web};

use crate::config::AuthConfig;

use error_code::ErrorCode;
use helpers::error_response;
use middleware::{TokenAuth, TokenRole};
use services::{
    admin_routes, ads_routes, commission_routes, conversion_routes, health_routes,
    redirect_routes,
};

pub const MAX_JSON_BODY: usize = 64 * 1024;

/// 请求体解析失败时同样返回结构化信封
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_JSON_BODY)
        .error_handler(|err, _req| {
            let message = err.to_string();
            error::InternalError::from_response(
                err,
                error_response(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, &message),
            )
            .into()
        })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        error::InternalError::from_response(
            err,
            error_response(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, &message),
        )
        .into()
    })
}

/// 注册全部路由；调用方负责提供 `web::Data<Arc<Engine>>`
pub fn configure(cfg: &mut web::ServiceConfig, auth: &AuthConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .service(health_routes())
        .service(redirect_routes())
        .service(ads_routes())
        .service(
            conversion_routes().wrap(TokenAuth::new(
                TokenRole::Collaborator,
                auth.collaborator_token.clone(),
            )),
        )
        .service(
            commission_routes().wrap(TokenAuth::new(
                TokenRole::Collaborator,
                auth.collaborator_token.clone(),
            )),
        )
        .service(
            web::scope("/admin")
                .wrap(TokenAuth::new(TokenRole::Admin, auth.admin_token.clone()))
                .configure(admin_routes),
        );
}
