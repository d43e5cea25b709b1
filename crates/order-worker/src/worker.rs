//! 订单处理工作者
//!
//! 单条消息的状态流转：
//!
//! ```text
//! FETCHED   → MALFORMED（负载无法解析）| PARSED
//! PARSED    → FAILED（处理器返回失败）| SUCCEEDED
//! FAILED    → REQUEUED（retries < max_retries）| DEAD_LETTERED
//! MALFORMED → DEAD_LETTERED
//! SUCCEEDED → CACHED
//! ```
//!
//! 每个终态之后提交一次原消息的偏移量，提交永远是该消息的最后一个动作。
//! 存储写入、回写或死信发布失败只记录日志，消息仍然提交：以单条结果可能丢失
//! 为代价换取前进性和有界的重试深度。

use std::sync::Arc;
use std::time::{Duration, Instant};

use order_shared::cache::KeyValueStore;
use order_shared::config::AppConfig;
use order_shared::kafka::{ConsumerMessage, MessagePublisher, MessageSource, ProducerMessage};
use order_shared::observability::metrics;
use order_shared::order::OrderMessage;
use order_shared::retry::{read_retry_count, with_retry_count};
use tracing::{error, info, warn};

use crate::error::WorkerError;
use crate::processor::OrderProcessor;

/// 进入死信队列的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// 负载无法解析为订单，与重试次数无关
    Malformed,
    /// 业务失败且已达到最大重试次数
    RetriesExhausted { retries: u32 },
}

/// 单条消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Cached { order_id: String },
    Requeued { order_id: String, retries: u32 },
    DeadLettered {
        order_id: Option<String>,
        reason: DeadLetterReason,
    },
}

impl MessageOutcome {
    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cached { .. } => "cached",
            Self::Requeued { .. } => "requeued",
            Self::DeadLettered {
                reason: DeadLetterReason::Malformed,
                ..
            } => "dead_lettered_malformed",
            Self::DeadLettered {
                reason: DeadLetterReason::RetriesExhausted { .. },
                ..
            } => "dead_lettered_exhausted",
        }
    }
}

/// 工作者运行参数，从 `AppConfig` 提取
#[derive(Debug, Clone)]
struct WorkerSettings {
    order_topic: String,
    dead_letter_topic: String,
    max_retries: u32,
    fetch_backoff: Duration,
    processing_delay: Duration,
}

/// 订单处理工作者
///
/// 组合消息来源（拉取 + 提交）、发布者（回写 + 死信）、结果存储和业务处理器。
/// 单进程内严格顺序处理，不会在上一条消息提交前拉取下一条。
pub struct OrderWorker {
    source: Arc<dyn MessageSource>,
    publisher: Arc<dyn MessagePublisher>,
    store: Arc<dyn KeyValueStore>,
    processor: Arc<dyn OrderProcessor>,
    settings: WorkerSettings,
}

impl OrderWorker {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn MessageSource>,
        publisher: Arc<dyn MessagePublisher>,
        store: Arc<dyn KeyValueStore>,
        processor: Arc<dyn OrderProcessor>,
    ) -> Self {
        Self {
            source,
            publisher,
            store,
            processor,
            settings: WorkerSettings {
                order_topic: config.kafka.order_topic.clone(),
                dead_letter_topic: config.kafka.dead_letter_topic.clone(),
                max_retries: config.worker.max_retries,
                fetch_backoff: config.worker.fetch_backoff(),
                processing_delay: config.worker.processing_delay(),
            },
        }
    }

    /// 启动消费循环
    ///
    /// 循环贯穿进程生命周期，拉取失败只会退避重试，不会返回。
    pub async fn run(&self) {
        info!(
            topic = %self.settings.order_topic,
            dead_letter_topic = %self.settings.dead_letter_topic,
            max_retries = self.settings.max_retries,
            "订单工作者已启动"
        );

        loop {
            self.poll_once().await;
        }
    }

    /// 拉取并处理一条消息
    ///
    /// 拉取失败时记录日志并按固定间隔退避，返回 None。
    pub async fn poll_once(&self) -> Option<MessageOutcome> {
        match self.source.fetch().await {
            Ok(msg) => Some(self.handle_message(&msg).await),
            Err(e) => {
                error!(
                    error = %e,
                    error_code = e.code(),
                    backoff_ms = self.settings.fetch_backoff.as_millis() as u64,
                    "拉取订单消息失败，退避后重试"
                );
                metrics::record_fetch_error();
                tokio::time::sleep(self.settings.fetch_backoff).await;
                None
            }
        }
    }

    /// 处理单条消息：执行终态动作，然后提交偏移量
    pub async fn handle_message(&self, msg: &ConsumerMessage) -> MessageOutcome {
        let start = Instant::now();

        let outcome = self.dispatch(msg).await;
        self.commit(msg).await;

        metrics::record_message_outcome(outcome.label(), start.elapsed().as_secs_f64());
        outcome
    }

    async fn dispatch(&self, msg: &ConsumerMessage) -> MessageOutcome {
        let order = match OrderMessage::from_payload(&msg.payload) {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    error = %e,
                    error_code = e.code(),
                    partition = msg.partition,
                    offset = msg.offset,
                    "订单负载无效，投递到死信队列"
                );
                self.dead_letter(msg, None).await;
                return MessageOutcome::DeadLettered {
                    order_id: None,
                    reason: DeadLetterReason::Malformed,
                };
            }
        };

        info!(
            order_id = %order.id,
            offset = msg.offset,
            produced_at_ms = ?msg.timestamp,
            "开始处理订单"
        );

        if !self.settings.processing_delay.is_zero() {
            tokio::time::sleep(self.settings.processing_delay).await;
        }

        match self.processor.process(&order).await {
            Ok(result) => {
                match result.to_json() {
                    Ok(value) => self.store_result(&order, &value).await,
                    Err(e) => {
                        error!(order_id = %order.id, error = %e, "处理结果序列化失败");
                        metrics::record_side_effect_error("store");
                    }
                }
                MessageOutcome::Cached { order_id: order.id }
            }
            Err(e) => self.handle_failure(msg, order, &e).await,
        }
    }

    /// 业务失败：未达上限则带递增重试头回写订单 topic，否则投递死信
    async fn handle_failure(
        &self,
        msg: &ConsumerMessage,
        order: OrderMessage,
        cause: &WorkerError,
    ) -> MessageOutcome {
        let retries = read_retry_count(&msg.headers);

        if retries >= self.settings.max_retries {
            warn!(
                order_id = %order.id,
                retries,
                error = %cause,
                "重试次数已耗尽，投递到死信队列"
            );
            self.dead_letter(msg, Some(&order.id)).await;
            return MessageOutcome::DeadLettered {
                order_id: Some(order.id),
                reason: DeadLetterReason::RetriesExhausted { retries },
            };
        }

        let next = retries + 1;
        let mut requeue = ProducerMessage::new(msg.payload.clone())
            .with_headers(with_retry_count(&msg.headers, next));
        requeue.key = msg.key.clone();

        match self
            .publisher
            .publish(&self.settings.order_topic, requeue)
            .await
        {
            Ok(_) => info!(order_id = %order.id, retry = next, error = %cause, "订单已重新入队"),
            Err(e) => {
                error!(order_id = %order.id, retry = next, error = %e, "订单重新入队失败");
                metrics::record_side_effect_error("requeue");
            }
        }

        MessageOutcome::Requeued {
            order_id: order.id,
            retries: next,
        }
    }

    /// 原样投递负载到死信 topic，不附带键和消息头
    async fn dead_letter(&self, msg: &ConsumerMessage, order_id: Option<&str>) {
        let record = ProducerMessage::new(msg.payload.clone());

        match self
            .publisher
            .publish(&self.settings.dead_letter_topic, record)
            .await
        {
            Ok(_) => info!(order_id = ?order_id, offset = msg.offset, "消息已投递到死信队列"),
            Err(e) => {
                error!(
                    order_id = ?order_id,
                    offset = msg.offset,
                    error = %e,
                    "投递死信队列失败，消息可能丢失"
                );
                metrics::record_side_effect_error("dead_letter");
            }
        }
    }

    async fn store_result(&self, order: &OrderMessage, value: &str) {
        let key = order.result_key();
        match self.store.set(&key, value).await {
            Ok(()) => info!(order_id = %order.id, key = %key, "订单处理结果已写入"),
            Err(e) => {
                error!(order_id = %order.id, key = %key, error = %e, "写入订单处理结果失败");
                metrics::record_side_effect_error("store");
            }
        }
    }

    async fn commit(&self, msg: &ConsumerMessage) {
        if let Err(e) = self.source.commit(msg).await {
            error!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "提交偏移量失败，消息可能被重复投递"
            );
            metrics::record_side_effect_error("commit");
        }
    }
}
