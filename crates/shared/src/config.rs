//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! 配置在进程启动时一次性构造，通过引用传入各组件的构造函数。

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{OrderError, Result};

/// 兼容旧部署方式的扁平环境变量，优先级高于配置文件和 ORDER__ 前缀变量
const LEGACY_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("KAFKA_BROKERS", "kafka.brokers"),
    ("KAFKA_TOPIC", "kafka.order_topic"),
    ("DLQ_TOPIC", "kafka.dead_letter_topic"),
    ("WORKER_GROUP", "kafka.consumer_group"),
    ("REDIS_ADDR", "redis.addr"),
    ("ORDER_SERVICE_ADDR", "service.order_addr"),
    ("CACHE_SERVICE_ADDR", "service.cache_addr"),
];

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// `host:port` 或完整的 `redis://` URL
    pub addr: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
        }
    }
}

impl RedisConfig {
    /// 规范化为 redis 客户端可接受的连接 URL
    pub fn connection_url(&self) -> String {
        let addr = self.addr.trim();
        if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{addr}")
        }
    }
}

/// Kafka 配置
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// 逗号分隔的 broker 地址列表
    pub brokers: String,
    pub consumer_group: String,
    /// 订单主 topic，工作者消费并在重试时回写
    pub order_topic: String,
    pub dead_letter_topic: String,
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            consumer_group: "order-worker".to_string(),
            order_topic: "orders".to_string(),
            dead_letter_topic: "orders-dlq".to_string(),
            auto_offset_reset: default_auto_offset_reset(),
        }
    }
}

impl KafkaConfig {
    /// 拆分 broker 列表，去除空白项
    pub fn broker_list(&self) -> Vec<&str> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect()
    }

    /// rdkafka `bootstrap.servers` 所需格式
    pub fn bootstrap_servers(&self) -> String {
        self.broker_list().join(",")
    }
}

/// 工作者运行参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 业务失败的最大重试次数，达到后进入死信队列
    pub max_retries: u32,
    /// 拉取失败后的固定等待时间
    pub fetch_backoff_ms: u64,
    /// 模拟业务处理耗时，为 0 时不等待
    pub processing_delay_ms: u64,
    /// 商品名以此前缀开头的订单视为业务失败
    pub failure_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fetch_backoff_ms: 1000,
            processing_delay_ms: 300,
            failure_prefix: "fail".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }
}

/// gRPC 前端监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// OrderService（订单接入）
    pub order_addr: String,
    /// CacheService（结果查询）
    pub cache_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            order_addr: "0.0.0.0:50051".to_string(),
            cache_addr: "0.0.0.0:50052".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn order_socket_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr("service.order_addr", &self.order_addr)
    }

    pub fn cache_socket_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr("service.cache_addr", &self.cache_addr)
    }
}

fn parse_socket_addr(name: &str, value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .map_err(|e| OrderError::Config(format!("{name} 不是有效的监听地址 \"{value}\": {e}")))
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub kafka: KafkaConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. .env 文件（若存在，仅注入进程环境变量）
    /// 2. config/default.toml
    /// 3. config/{environment}.toml
    /// 4. config/{service_name}.toml
    /// 5. 环境变量（ORDER__ 前缀，如 ORDER__KAFKA__BROKERS -> kafka.brokers）
    /// 6. 扁平环境变量（KAFKA_BROKERS、KAFKA_TOPIC、DLQ_TOPIC、WORKER_GROUP、REDIS_ADDR、
    ///    ORDER_SERVICE_ADDR、CACHE_SERVICE_ADDR），空值视为未设置
    ///
    /// 任一必需项缺失或为空时返回错误，调用方应直接终止进程。
    pub fn load(service_name: &str) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), ".env 文件已加载");
        }

        let env = std::env::var("ORDER_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let mut builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{env}.toml"))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{service_name}.toml")))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("ORDER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        Self::from_builder(builder)
    }

    /// 构建、反序列化并校验
    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验必需项非空
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("kafka.brokers", self.kafka.broker_list().is_empty()),
            ("kafka.order_topic", self.kafka.order_topic.trim().is_empty()),
            (
                "kafka.dead_letter_topic",
                self.kafka.dead_letter_topic.trim().is_empty(),
            ),
            (
                "kafka.consumer_group",
                self.kafka.consumer_group.trim().is_empty(),
            ),
            ("redis.addr", self.redis.addr.trim().is_empty()),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, empty)| *empty)
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(OrderError::Config(format!(
                "缺少必需配置项: {}",
                missing.join(", ")
            )));
        }

        if self.kafka.order_topic == self.kafka.dead_letter_topic {
            return Err(OrderError::Config(
                "死信 topic 不能与订单主 topic 相同".to_string(),
            ));
        }

        Ok(())
    }
}
