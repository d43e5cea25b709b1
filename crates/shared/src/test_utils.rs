//! 测试工具模块
//!
//! 提供内存版队列与存储实现（支持故障注入）以及测试配置，
//! 使工作者和服务层的测试无需真实的 Kafka / Redis。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::cache::KeyValueStore;
use crate::config::{AppConfig, KafkaConfig, WorkerConfig};
use crate::error::{OrderError, Result};
use crate::kafka::{ConsumerMessage, MessageHeader, MessagePublisher, MessageSource, ProducerMessage};
use crate::order::OrderMessage;

// ==================== 测试配置辅助 ====================

/// 测试用应用配置：无模拟延迟、无拉取退避
pub fn test_app_config() -> AppConfig {
    AppConfig {
        service_name: "order-worker-test".to_string(),
        environment: "test".to_string(),
        kafka: KafkaConfig {
            brokers: "localhost:9092".to_string(),
            consumer_group: "order-worker-test".to_string(),
            order_topic: "orders".to_string(),
            dead_letter_topic: "orders-dlq".to_string(),
            auto_offset_reset: "earliest".to_string(),
        },
        worker: WorkerConfig {
            fetch_backoff_ms: 0,
            processing_delay_ms: 0,
            ..WorkerConfig::default()
        },
        ..AppConfig::default()
    }
}

// ==================== 内存队列 ====================

/// 内存版单分区队列
///
/// 发布到被消费 topic 的消息会按顺序追加到待消费队列，
/// 从而模拟工作者"回写同一 topic"的重试路径。
pub struct InMemoryQueue {
    topic: String,
    next_offset: AtomicUsize,
    pending: Mutex<VecDeque<ConsumerMessage>>,
    published: Mutex<Vec<(String, ProducerMessage)>>,
    committed: Mutex<Vec<i64>>,
    notify: Notify,
    fetch_failures: AtomicU32,
    fetch_calls: AtomicUsize,
    failing_topics: Mutex<HashSet<String>>,
    fail_commits: AtomicBool,
}

impl InMemoryQueue {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            next_offset: AtomicUsize::new(0),
            pending: Mutex::new(VecDeque::new()),
            published: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
            notify: Notify::new(),
            fetch_failures: AtomicU32::new(0),
            fetch_calls: AtomicUsize::new(0),
            failing_topics: Mutex::new(HashSet::new()),
            fail_commits: AtomicBool::new(false),
        }
    }

    /// 追加一条待消费消息，返回分配的偏移量
    pub fn push(
        &self,
        key: Option<Vec<u8>>,
        payload: impl Into<Vec<u8>>,
        headers: Vec<MessageHeader>,
    ) -> i64 {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst) as i64;
        let message = ConsumerMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset,
            key,
            payload: payload.into(),
            timestamp: None,
            headers,
        };
        self.pending.lock().push_back(message);
        self.notify.notify_one();
        offset
    }

    /// 以订单 id 作为键追加一条订单消息
    pub fn push_order(&self, order: &OrderMessage) -> i64 {
        let payload = order.to_payload().expect("订单序列化失败");
        self.push(Some(order.id.clone().into_bytes()), payload, Vec::new())
    }

    /// 取出下一条待消费消息（不经过 fetch 故障注入）
    pub fn take_next(&self) -> Option<ConsumerMessage> {
        self.pending.lock().pop_front()
    }

    /// 接下来 n 次 fetch 返回错误
    pub fn fail_next_fetches(&self, n: u32) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    /// 发布到该 topic 时返回错误
    pub fn fail_publish_to(&self, topic: &str) {
        self.failing_topics.lock().insert(topic.to_string());
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// 已成功发布到指定 topic 的消息
    pub fn published_to(&self, topic: &str) -> Vec<ProducerMessage> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// 已提交的偏移量（按提交顺序）
    pub fn committed_offsets(&self) -> Vec<i64> {
        self.committed.lock().clone()
    }
}

#[async_trait]
impl MessageSource for InMemoryQueue {
    async fn fetch(&self) -> Result<ConsumerMessage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(OrderError::Kafka("模拟拉取失败".to_string()));
        }

        loop {
            if let Some(message) = self.take_next() {
                return Ok(message);
            }
            self.notify.notified().await;
        }
    }

    async fn commit(&self, message: &ConsumerMessage) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(OrderError::Kafka("模拟提交失败".to_string()));
        }
        self.committed.lock().push(message.offset);
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for InMemoryQueue {
    async fn publish(&self, topic: &str, message: ProducerMessage) -> Result<(i32, i64)> {
        if self.failing_topics.lock().contains(topic) {
            return Err(OrderError::Kafka(format!("模拟发布失败: {topic}")));
        }

        self.published
            .lock()
            .push((topic.to_string(), message.clone()));

        if topic == self.topic {
            let offset = self.push(message.key, message.payload, message.headers);
            return Ok((0, offset));
        }

        let offset = self.published_to(topic).len() as i64 - 1;
        Ok((0, offset))
    }
}

// ==================== 内存存储 ====================

/// 内存版键值存储
#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入，不计入写入记录
    pub fn insert(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// 通过 `KeyValueStore::set` 发生的全部写入
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OrderError::Internal("模拟存储写入失败".to_string()));
        }
        self.writes.lock().push((key.to_string(), value.to_string()));
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(OrderError::Internal("模拟存储读取失败".to_string()));
        }
        Ok(self.value(key))
    }
}
