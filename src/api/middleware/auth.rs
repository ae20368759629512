use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::CONTENT_TYPE,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, trace};

use crate::api::error_code::ErrorCode;
use crate::api::types::ApiResponse;

/// 受保护接口的调用方
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TokenRole {
    /// 运营与活动配置
    Admin,
    /// 结算 / 打款等协作服务
    Collaborator,
}

/// Bearer token 认证中间件
///
/// token 为空时整个 scope 返回 404。
#[derive(Clone)]
pub struct TokenAuth {
    role: TokenRole,
    token: Rc<str>,
}

impl TokenAuth {
    pub fn new(role: TokenRole, token: impl Into<String>) -> Self {
        Self {
            role,
            token: Rc::from(token.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TokenAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = TokenAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TokenAuthMiddleware {
            service: Rc::new(service),
            role: self.role,
            token: self.token.clone(),
        }))
    }
}

pub struct TokenAuthMiddleware<S> {
    service: Rc<S>,
    role: TokenRole,
    token: Rc<str>,
}

impl<S, B> TokenAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    fn handle_missing_token(req: ServiceRequest, role: TokenRole) -> ServiceResponse<EitherBody<B>> {
        debug!("{} token not configured - returning 404", role);
        req.into_response(
            HttpResponse::NotFound()
                .insert_header((CONTENT_TYPE, "text/plain; charset=utf-8"))
                .body("Not Found")
                .map_into_right_body(),
        )
    }

    fn handle_unauthorized(req: ServiceRequest, role: TokenRole) -> ServiceResponse<EitherBody<B>> {
        info!(
            "{} authentication failed for {} - invalid or missing token",
            role,
            req.path()
        );
        req.into_response(
            HttpResponse::Unauthorized()
                .insert_header((CONTENT_TYPE, "application/json; charset=utf-8"))
                .json(ApiResponse::<()> {
                    code: ErrorCode::Unauthorized as i32,
                    message: "Unauthorized: Invalid or missing token".to_string(),
                    data: None,
                })
                .map_into_right_body(),
        )
    }

    /// 从 Authorization header 提取 Bearer token
    fn extract_bearer_token(req: &ServiceRequest) -> Option<&str> {
        req.headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
    }
}

/// 常量时间比较
pub fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

impl<S, B> Service<ServiceRequest> for TokenAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let role = self.role;
        let token = self.token.clone();

        Box::pin(async move {
            if token.is_empty() {
                return Ok(Self::handle_missing_token(req, role));
            }

            let authorized = Self::extract_bearer_token(&req)
                .is_some_and(|presented| token_matches(presented, &token));
            if !authorized {
                return Ok(Self::handle_unauthorized(req, role));
            }

            trace!("{} token accepted for {}", role, req.path());
            srv.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}
