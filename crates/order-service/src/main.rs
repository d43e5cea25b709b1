//! 订单 gRPC 前端进程
//!
//! 在两个端口上分别提供 OrderService（接入）与 CacheService（结果查询），
//! 收到终止信号后两个服务一起优雅退出。

use std::sync::Arc;

use anyhow::{Context, Result};
use order_proto::order::cache_service_server::CacheServiceServer;
use order_proto::order::order_service_server::OrderServiceServer;
use order_service::{CacheGrpcService, KafkaOrderIntake, OrderGrpcService, StoreResultQuery};
use order_shared::cache::Cache;
use order_shared::config::AppConfig;
use order_shared::kafka::KafkaProducer;
use order_shared::observability;
use tokio::signal;
use tokio::sync::watch;
use tonic::transport::Server;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load("order-service").context("配置加载失败")?;
    let order_addr = config.service.order_socket_addr()?;
    let cache_addr = config.service.cache_socket_addr()?;

    // 2. 初始化日志与指标
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        brokers = %config.kafka.bootstrap_servers(),
        topic = %config.kafka.order_topic,
        "Starting order-service..."
    );

    // 3. 初始化依赖
    let producer = KafkaProducer::new(&config.kafka)?;
    let cache = Cache::new(&config.redis)?;
    if let Err(e) = cache.health_check().await {
        warn!(addr = %config.redis.addr, error = %e, "Redis 健康检查失败");
    }

    let order_service = OrderGrpcService::new(Arc::new(KafkaOrderIntake::new(
        &config,
        Arc::new(producer),
    )));
    let cache_service = CacheGrpcService::new(Arc::new(StoreResultQuery::new(Arc::new(cache))));

    // 4. 启动 gRPC 服务，共用同一个关闭信号
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    info!("OrderService listening on {}", order_addr);
    info!("CacheService listening on {}", cache_addr);

    let order_server = Server::builder()
        .add_service(OrderServiceServer::new(order_service))
        .serve_with_shutdown(order_addr, shutdown_requested(shutdown_rx.clone()));
    let cache_server = Server::builder()
        .add_service(CacheServiceServer::new(cache_service))
        .serve_with_shutdown(cache_addr, shutdown_requested(shutdown_rx));

    tokio::try_join!(order_server, cache_server)?;

    info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_requested(mut rx: watch::Receiver<()>) {
    let _ = rx.changed().await;
}

/// 等待进程终止信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
