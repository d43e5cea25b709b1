//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为 `MessageSource`（拉取 + 提交）与
//! `MessagePublisher`（发布）两个 trait，工作者和接入服务只依赖 trait，
//! 测试时可替换为内存实现。消费者关闭自动提交，偏移量只在工作者完成
//! 终态动作后显式提交。

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::{OrderError, Result};

// ---------------------------------------------------------------------------
// MessageHeader
// ---------------------------------------------------------------------------

/// 消息头，保留原始字节值与出现顺序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub key: String,
    pub value: Vec<u8>,
}

impl MessageHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。工作者从不原地修改它，
/// 重新投递时总是构造新的 `ProducerMessage`。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: Vec<MessageHeader>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let mut headers = Vec::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                headers.push(MessageHeader {
                    key: header.key.to_string(),
                    value: header.value.map(<[u8]>::to_vec).unwrap_or_default(),
                });
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            timestamp: msg.timestamp().to_millis(),
            headers,
        }
    }
}

// ---------------------------------------------------------------------------
// ProducerMessage
// ---------------------------------------------------------------------------

/// 待发布的消息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerMessage {
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<MessageHeader>,
}

impl ProducerMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: Vec<MessageHeader>) -> Self {
        self.headers = headers;
        self
    }
}

// ---------------------------------------------------------------------------
// Trait 抽象
// ---------------------------------------------------------------------------

/// 带消费组偏移量提交语义的消息来源
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// 阻塞直到拿到下一条消息或出错
    async fn fetch(&self) -> Result<ConsumerMessage>;

    /// 提交该消息的偏移量，表示已处理到此处
    async fn commit(&self, message: &ConsumerMessage) -> Result<()>;
}

/// 消息发布者
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// 发布到指定 topic，返回写入的 (partition, offset)
    async fn publish(&self, topic: &str, message: ProducerMessage) -> Result<(i32, i64)>;
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer`，内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的）。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// `message.timeout.ms` 为 5 秒：超时后由工作者记录日志并继续，不在此层重试。
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let brokers = config.bootstrap_servers();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| OrderError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }
}

#[async_trait]
impl MessagePublisher for KafkaProducer {
    async fn publish(&self, topic: &str, message: ProducerMessage) -> Result<(i32, i64)> {
        let mut headers = OwnedHeaders::new_with_capacity(message.headers.len());
        for header in &message.headers {
            headers = headers.insert(Header {
                key: header.key.as_str(),
                value: Some(header.value.as_slice()),
            });
        }

        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(topic)
            .payload(message.payload.as_slice())
            .headers(headers);
        if let Some(key) = message.key.as_deref() {
            record = record.key(key);
        }

        // rdkafka 0.39+ 返回 Delivery 结构体而非元组
        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| OrderError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 关闭自动提交，由调用方在每条消息的终态动作之后显式调用 `commit`。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者，使用配置中的消费组
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let brokers = config.bootstrap_servers();
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| OrderError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| OrderError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    async fn fetch(&self) -> Result<ConsumerMessage> {
        let borrowed = self
            .consumer
            .recv()
            .await
            .map_err(|e| OrderError::Kafka(format!("接收消息失败: {e}")))?;
        let msg = ConsumerMessage::from_borrowed(&borrowed);

        debug!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "收到 Kafka 消息"
        );
        Ok(msg)
    }

    async fn commit(&self, message: &ConsumerMessage) -> Result<()> {
        // Kafka 提交的是"下一条待消费"的偏移量
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| OrderError::Kafka(format!("构造提交偏移量失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| OrderError::Kafka(format!("提交偏移量失败: {e}")))?;

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "偏移量已提交"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
