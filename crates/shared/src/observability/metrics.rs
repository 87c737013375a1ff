//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标描述（出现在 /metrics 的 HELP 注释中）
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "display_condition_checks_total",
        "Total number of display condition checks"
    );
    metrics::describe_histogram!(
        "display_condition_check_duration_seconds",
        "Display condition check duration in seconds"
    );
    metrics::describe_counter!(
        "display_condition_fail_open_total",
        "Condition rows that passed because no check value was available"
    );
    metrics::describe_counter!(
        "display_condition_skipped_rows_total",
        "Malformed condition rows skipped during grouping"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次条件检查（domain 为 content / visitor）
#[inline]
pub fn record_condition_check(domain: &str, passed: bool, duration_secs: f64) {
    metrics::counter!(
        "display_condition_checks_total",
        "domain" => domain.to_string(),
        "passed" => passed.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "display_condition_check_duration_seconds",
        "domain" => domain.to_string()
    )
    .record(duration_secs);
}

/// 记录因缺少比较值而直接放行的条件行
#[inline]
pub fn record_fail_open(domain: &str, reason: &str) {
    metrics::counter!(
        "display_condition_fail_open_total",
        "domain" => domain.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录分组时被跳过的畸形条件行
#[inline]
pub fn record_skipped_rows(count: usize) {
    metrics::counter!("display_condition_skipped_rows_total").increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("POST", "/v1/evaluate", 200, 0.01);
        record_condition_check("content", true, 0.0001);
        record_fail_open("visitor", "unknown_target");
        record_skipped_rows(2);
    }
}
