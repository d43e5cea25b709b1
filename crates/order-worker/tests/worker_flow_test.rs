//! 订单工作者流程测试
//!
//! 使用内存队列与存储驱动完整的"拉取 → 处理 → 终态动作 → 提交"流程，
//! 覆盖重试循环、死信路由和拉取失败后的恢复；
//! 副作用与提交的先后顺序通过 mockall 的 Sequence 校验。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::{Sequence, mock};
use order_shared::config::AppConfig;
use order_shared::error::{OrderError, Result};
use order_shared::kafka::{
    ConsumerMessage, MessageHeader, MessagePublisher, MessageSource, ProducerMessage,
};
use order_shared::order::{OrderMessage, ProcessingResult};
use order_shared::retry::read_retry_count;
use order_shared::test_utils::{InMemoryQueue, InMemoryStore, test_app_config};
use order_worker::{DeadLetterReason, MessageOutcome, OrderWorker, SentinelProcessor};

mock! {
    pub Source {}

    #[async_trait]
    impl MessageSource for Source {
        async fn fetch(&self) -> Result<ConsumerMessage>;
        async fn commit(&self, message: &ConsumerMessage) -> Result<()>;
    }
}

mock! {
    pub Publisher {}

    #[async_trait]
    impl MessagePublisher for Publisher {
        async fn publish(&self, topic: &str, message: ProducerMessage) -> Result<(i32, i64)>;
    }
}

// ==================== 辅助函数 ====================

fn build_worker(
    config: &AppConfig,
    queue: &Arc<InMemoryQueue>,
    store: &Arc<InMemoryStore>,
) -> OrderWorker {
    OrderWorker::new(
        config,
        queue.clone(),
        queue.clone(),
        store.clone(),
        Arc::new(SentinelProcessor::new(config.worker.failure_prefix.clone())),
    )
}

fn inbound(offset: i64, payload: &[u8], headers: Vec<MessageHeader>) -> ConsumerMessage {
    ConsumerMessage {
        topic: "orders".to_string(),
        partition: 3,
        offset,
        key: Some(b"order-key".to_vec()),
        payload: payload.to_vec(),
        timestamp: Some(1_700_000_000_000),
        headers,
    }
}

// ==================== 场景测试 ====================

#[tokio::test]
async fn test_successful_order_scenario() {
    let config = test_app_config();
    let queue = Arc::new(InMemoryQueue::new("orders"));
    let store = Arc::new(InMemoryStore::new());
    let worker = build_worker(&config, &queue, &store);

    queue.push_order(&OrderMessage::new("1", "book", 42));
    let outcome = worker.poll_once().await;

    assert_eq!(
        outcome,
        Some(MessageOutcome::Cached {
            order_id: "1".to_string()
        })
    );
    let stored: serde_json::Value =
        serde_json::from_str(&store.value("order:1").expect("应写入结果")).unwrap();
    assert_eq!(
        stored,
        serde_json::json!({"item": "book", "price": 42, "status": "done"})
    );
    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn test_failing_order_retries_then_dead_letters() {
    let config = test_app_config();
    let queue = Arc::new(InMemoryQueue::new("orders"));
    let store = Arc::new(InMemoryStore::new());
    let worker = build_worker(&config, &queue, &store);

    let order = OrderMessage::new("2", "fail-x", 5);
    queue.push_order(&order);

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        outcomes.push(worker.poll_once().await.expect("不应出现拉取失败"));
    }

    assert_eq!(
        outcomes,
        vec![
            MessageOutcome::Requeued {
                order_id: "2".to_string(),
                retries: 1
            },
            MessageOutcome::Requeued {
                order_id: "2".to_string(),
                retries: 2
            },
            MessageOutcome::Requeued {
                order_id: "2".to_string(),
                retries: 3
            },
            MessageOutcome::DeadLettered {
                order_id: Some("2".to_string()),
                reason: DeadLetterReason::RetriesExhausted { retries: 3 }
            },
        ]
    );

    // 每次回写的重试头恰好比上一次大 1，键和负载保持不变
    let requeued = queue.published_to("orders");
    let counts: Vec<u32> = requeued.iter().map(|m| read_retry_count(&m.headers)).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    let payload = order.to_payload().unwrap();
    assert!(requeued.iter().all(|m| m.payload == payload));
    assert!(requeued.iter().all(|m| m.key.as_deref() == Some(&b"2"[..])));

    // 死信负载与原始负载一致
    assert_eq!(queue.published_to("orders-dlq"), vec![ProducerMessage::new(payload)]);

    // 每次拉取恰好提交一次，结果从未写入
    assert_eq!(queue.committed_offsets(), vec![0, 1, 2, 3]);
    assert_eq!(queue.pending_len(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_custom_retry_limit() {
    let mut config = test_app_config();
    config.worker.max_retries = 1;
    let queue = Arc::new(InMemoryQueue::new("orders"));
    let store = Arc::new(InMemoryStore::new());
    let worker = build_worker(&config, &queue, &store);

    queue.push_order(&OrderMessage::new("9", "fail-now", 1));

    assert_eq!(worker.poll_once().await.map(|o| o.label()), Some("requeued"));
    assert_eq!(
        worker.poll_once().await.map(|o| o.label()),
        Some("dead_lettered_exhausted")
    );
    assert_eq!(queue.published_to("orders-dlq").len(), 1);
}

#[tokio::test]
async fn test_unparsable_payload_scenario() {
    let config = test_app_config();
    let queue = Arc::new(InMemoryQueue::new("orders"));
    let store = Arc::new(InMemoryStore::new());
    let worker = build_worker(&config, &queue, &store);

    queue.push(None, b"{\"id\":".to_vec(), Vec::new());
    queue.push_order(&OrderMessage::new("", "book", 1));

    for _ in 0..2 {
        assert_eq!(
            worker.poll_once().await,
            Some(MessageOutcome::DeadLettered {
                order_id: None,
                reason: DeadLetterReason::Malformed
            })
        );
    }

    assert_eq!(queue.published_to("orders-dlq").len(), 2);
    assert_eq!(queue.committed_offsets(), vec![0, 1]);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_whitespace_id_is_processed_not_dead_lettered() {
    let config = test_app_config();
    let queue = Arc::new(InMemoryQueue::new("orders"));
    let store = Arc::new(InMemoryStore::new());
    let worker = build_worker(&config, &queue, &store);

    queue.push(
        Some(b" ".to_vec()),
        br#"{"id":" ","item":"book","price":42}"#.to_vec(),
        Vec::new(),
    );

    assert_eq!(
        worker.poll_once().await,
        Some(MessageOutcome::Cached {
            order_id: " ".to_string()
        })
    );
    assert!(queue.published_to("orders-dlq").is_empty());
    assert_eq!(
        store.value("order: ").as_deref(),
        Some(r#"{"item":"book","price":42,"status":"done"}"#)
    );
    assert_eq!(queue.committed_offsets(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_recovers_from_fetch_errors() {
    let mut config = test_app_config();
    config.worker.fetch_backoff_ms = 1000;
    let queue = Arc::new(InMemoryQueue::new("orders"));
    let store = Arc::new(InMemoryStore::new());
    let worker = Arc::new(build_worker(&config, &queue, &store));

    queue.fail_next_fetches(3);
    queue.push_order(&OrderMessage::new("1", "book", 42));

    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    let stored = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(value) = store.value("order:1") {
                break value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("工作者应在拉取恢复后处理消息");
    handle.abort();

    assert_eq!(
        ProcessingResult::from_json(&stored).unwrap(),
        ProcessingResult::done(&OrderMessage::new("1", "book", 42))
    );
    assert!(queue.fetch_calls() >= 4);
    assert_eq!(queue.committed_offsets(), vec![0]);
}

// ==================== 顺序校验 ====================

#[tokio::test]
async fn test_dead_letter_publish_precedes_commit() {
    let mut seq = Sequence::new();
    let mut source = MockSource::new();
    let mut publisher = MockPublisher::new();

    publisher
        .expect_publish()
        .withf(|topic, message| {
            topic == "orders-dlq"
                && message.payload == b"garbage"
                && message.key.is_none()
                && message.headers.is_empty()
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok((0, 10)));
    source
        .expect_commit()
        .withf(|message| message.offset == 7)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let worker = OrderWorker::new(
        &test_app_config(),
        Arc::new(source),
        Arc::new(publisher),
        Arc::new(InMemoryStore::new()),
        Arc::new(SentinelProcessor::default()),
    );

    let msg = inbound(7, b"garbage", vec![MessageHeader::new("retries", "1")]);
    worker.handle_message(&msg).await;
}

#[tokio::test]
async fn test_requeue_preserves_key_and_commits_after_publish_error() {
    let mut seq = Sequence::new();
    let mut source = MockSource::new();
    let mut publisher = MockPublisher::new();

    publisher
        .expect_publish()
        .withf(|topic, message| {
            topic == "orders"
                && message.key.as_deref() == Some(&b"order-key"[..])
                && message.headers
                    == vec![
                        MessageHeader::new("x-source", "intake"),
                        MessageHeader::new("retries", "3"),
                    ]
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(OrderError::Kafka("broker unavailable".to_string())));
    source
        .expect_commit()
        .withf(|message| message.offset == 11 && message.partition == 3)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let worker = OrderWorker::new(
        &test_app_config(),
        Arc::new(source),
        Arc::new(publisher),
        Arc::new(InMemoryStore::new()),
        Arc::new(SentinelProcessor::default()),
    );

    let msg = inbound(
        11,
        br#"{"id":"5","item":"fail-later","price":3}"#,
        vec![
            MessageHeader::new("x-source", "intake"),
            MessageHeader::new("retries", "2"),
        ],
    );
    let outcome = worker.handle_message(&msg).await;

    assert_eq!(
        outcome,
        MessageOutcome::Requeued {
            order_id: "5".to_string(),
            retries: 3
        }
    );
    // 入站消息本身未被修改
    assert_eq!(read_retry_count(&msg.headers), 2);
}

#[tokio::test]
async fn test_commit_failure_is_not_retried() {
    let mut source = MockSource::new();
    let publisher = MockPublisher::new();

    source
        .expect_commit()
        .times(1)
        .returning(|_| Err(OrderError::Kafka("coordinator moved".to_string())));

    let store = Arc::new(InMemoryStore::new());
    let worker = OrderWorker::new(
        &test_app_config(),
        Arc::new(source),
        Arc::new(publisher),
        store.clone(),
        Arc::new(SentinelProcessor::default()),
    );

    let msg = inbound(1, br#"{"id":"8","item":"pen","price":2}"#, Vec::new());
    let outcome = worker.handle_message(&msg).await;

    assert_eq!(outcome.label(), "cached");
    assert!(store.value("order:8").is_some());
}
