//! 异步评估 HTTP 接口
//!
//! 缓存友好的页面在客户端发起后续请求，携带首次渲染时的序列化上下文，
//! 由这里以上下文模式完成检查。

pub mod dto;
pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::AppState;

/// 构建路由
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/evaluate", post(handlers::evaluate))
        .route("/v1/targets", get(handlers::list_targets))
        .route("/health", get(handlers::health_check))
}
