//! 订单处理工作者进程
//!
//! 加载并校验配置，建立 Kafka / Redis 客户端后进入消费循环，
//! 直到进程收到终止信号。

use std::sync::Arc;

use anyhow::{Context, Result};
use order_shared::cache::Cache;
use order_shared::config::AppConfig;
use order_shared::kafka::{KafkaConsumer, KafkaProducer};
use order_shared::observability;
use order_worker::{OrderWorker, SentinelProcessor};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：缺少必需项时直接退出，不以部分配置运行
    let config = AppConfig::load("order-worker").context("配置加载失败")?;

    // 2. 初始化日志与指标
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        brokers = %config.kafka.bootstrap_servers(),
        topic = %config.kafka.order_topic,
        dead_letter_topic = %config.kafka.dead_letter_topic,
        group_id = %config.kafka.consumer_group,
        "Starting order-worker..."
    );

    // 3. 初始化 Kafka 客户端
    let consumer = KafkaConsumer::new(&config.kafka)?;
    consumer.subscribe(&[config.kafka.order_topic.as_str()])?;
    let producer = KafkaProducer::new(&config.kafka)?;

    // 4. 初始化 Redis，启动时不可达只告警，写入失败由工作者记录
    let cache = Cache::new(&config.redis)?;
    if let Err(e) = cache.health_check().await {
        warn!(addr = %config.redis.addr, error = %e, "Redis 健康检查失败");
    }

    let worker = OrderWorker::new(
        &config,
        Arc::new(consumer),
        Arc::new(producer),
        Arc::new(cache),
        Arc::new(SentinelProcessor::new(config.worker.failure_prefix.clone())),
    );

    tokio::select! {
        _ = worker.run() => {}
        _ = shutdown_signal() => {}
    }

    info!("order-worker stopped");
    Ok(())
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
