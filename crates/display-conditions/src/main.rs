//! 展示条件异步评估服务
//!
//! 为缓存页面上的客户端后续请求提供 HTTP 评估接口。

use anyhow::Result;
use axum::{Router, http::HeaderValue, middleware};
use display_conditions::{
    api::{self, AppState},
    memory::PostCatalog,
    store::RuleSetStore,
};
use display_shared::{
    config::AppConfig,
    observability::{self, middleware as obs_middleware},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("display-conditions").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting display-conditions on {}", config.server_addr());

    let store = RuleSetStore::new();
    match &config.engine.rules_path {
        Some(path) => match store.load_file(path) {
            Ok(count) => info!("Loaded display conditions for {} units", count),
            Err(e) => warn!("Failed to load rules: {}, starting with empty store", e),
        },
        None => info!("No rules_path configured, every unit displays"),
    }

    let catalog = match &config.engine.catalog_path {
        Some(path) => PostCatalog::load_file(path).unwrap_or_else(|e| {
            warn!("Failed to load post catalog: {}, post facts resolve empty", e);
            PostCatalog::new()
        }),
        None => PostCatalog::new(),
    };

    let state = AppState::new(store, catalog).with_trace(config.engine.trace_evaluations);

    let cors = match config.server.allowed_origins() {
        None => {
            if config.is_production() {
                warn!("cors_origins=\"*\" 在生产环境中不安全，请设置为具体站点域名");
            }
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        Some(origins) => {
            info!("CORS allowed_origins: {}", origins.join(","));
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|s| s.parse::<HeaderValue>().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    let app = Router::new()
        .merge(api::routes())
        .layer(cors)
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// 收到 SIGTERM 或 Ctrl+C 后返回，触发 axum 的优雅关闭流程。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("注册 Ctrl+C 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("注册 SIGTERM 处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
