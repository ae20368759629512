//! Server mode
//!
//! 准备好引擎后启动 HTTP 服务，收到 Ctrl+C 时刷盘退出。

use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use tracing::{info, warn};

use crate::api::{self, middleware::TimingMiddleware};
use crate::runtime::lifetime;

/// **Note**: 调用前必须已初始化配置与日志
pub async fn run_server() -> Result<()> {
    let startup = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let engine = startup.engine.clone();
    let config = startup.config.clone();

    if config.auth.admin_token.is_empty() {
        info!("Admin API is disabled (auth.admin_token not set)");
    }
    if config.auth.collaborator_token.is_empty() {
        warn!("Conversion and commission APIs are disabled (auth.collaborator_token not set)");
    }
    if config.server.trusted_proxies.is_empty() {
        warn!(
            "Auto-detect proxy mode: connections from private IPs will use X-Forwarded-For. \
             Configure server.trusted_proxies explicitly to restrict this."
        );
    }

    let cpu_count = config.server.cpu_count.clamp(1, 32);
    warn!("Using {} CPU cores for the server", cpu_count);

    let auth = config.auth.clone();
    let engine_for_app = engine.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TimingMiddleware)
            .wrap(Compress::default())
            .wrap(DefaultHeaders::new().add(("Connection", "keep-alive")))
            .app_data(web::Data::new(engine_for_app.clone()))
            .configure(|cfg| api::configure(cfg, &auth))
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .client_request_timeout(std::time::Duration::from_millis(5000))
    .client_disconnect_timeout(std::time::Duration::from_millis(1000))
    .workers(cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);
    let server = server.bind(bind_address)?.disable_signals().run();
    let handle = server.handle();

    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown(engine.clone()) => {
            handle.stop(true).await;
            warn!("Graceful shutdown: all tasks completed");
        }
    }

    Ok(())
}
