//! 请求耗时记录
//!
//! 超过阈值的请求以 warn 级别输出，其余为 debug。

use actix_service::{Service, Transform};
use actix_web::{
    Error,
    dev::{ServiceRequest, ServiceResponse},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SLOW_REQUEST: Duration = Duration::from_millis(500);

#[derive(Clone, Default)]
pub struct TimingMiddleware;

impl<S, B> Transform<S, ServiceRequest> for TimingMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TimingService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TimingService {
            service: Rc::new(service),
        }))
    }
}

pub struct TimingService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for TimingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
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
        let start = Instant::now();
        let method = req.method().clone();
        let endpoint = classify_endpoint(req.path());

        Box::pin(async move {
            let result = srv.call(req).await;
            let elapsed = start.elapsed();
            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(_) => 500,
            };

            if elapsed >= SLOW_REQUEST {
                warn!(
                    "Slow request: {} {} -> {} in {:?}",
                    method, endpoint, status, elapsed
                );
            } else {
                debug!("{} {} -> {} in {:?}", method, endpoint, status, elapsed);
            }
            result
        })
    }
}

/// 按入口归类，避免把短码等高基数路径写进日志
fn classify_endpoint(path: &str) -> &'static str {
    if path.starts_with("/resolve/") {
        "resolve"
    } else if path.starts_with("/ads/") {
        "ads"
    } else if path.starts_with("/conversions") {
        "conversions"
    } else if path.starts_with("/commissions") {
        "commissions"
    } else if path.starts_with("/admin") {
        "admin"
    } else if path.starts_with("/health") {
        "health"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_endpoint() {
        assert_eq!(classify_endpoint("/resolve/abc123"), "resolve");
        assert_eq!(classify_endpoint("/commissions/export"), "commissions");
        assert_eq!(classify_endpoint("/health/live"), "health");
        assert_eq!(classify_endpoint("/favicon.ico"), "other");
    }
}
