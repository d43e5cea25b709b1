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

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 与 `/health` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "order_messages_total",
        "Total number of order messages handled, by terminal outcome"
    );
    metrics::describe_histogram!(
        "order_processing_duration_seconds",
        "Time from fetch to commit for a single order message"
    );
    metrics::describe_counter!(
        "order_fetch_errors_total",
        "Total number of failed fetches from the order topic"
    );
    metrics::describe_counter!(
        "order_side_effect_errors_total",
        "Total number of failed publish, store or commit calls"
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
// 便捷的指标记录函数
// ============================================================================

/// 记录一条消息的终态结果
#[inline]
pub fn record_message_outcome(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("order_messages_total", "outcome" => outcome).increment(1);
    metrics::histogram!("order_processing_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}

/// 记录拉取失败
#[inline]
pub fn record_fetch_error() {
    metrics::counter!("order_fetch_errors_total").increment(1);
}

/// 记录副作用失败（action: requeue / dead_letter / store / commit）
#[inline]
pub fn record_side_effect_error(action: &'static str) {
    metrics::counter!("order_side_effect_errors_total", "action" => action).increment(1);
}
