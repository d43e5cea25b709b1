//! 订单处理工作者
//!
//! 从 Kafka 订单 topic 逐条消费订单，判定成功或失败：
//! 成功结果写入 Redis `order:<id>`，失败订单带递增的重试头回写同一 topic，
//! 重试耗尽或负载无法解析的消息投递到死信 topic。每条消息在终态动作之后提交偏移量。

pub mod error;
pub mod processor;
pub mod worker;

pub use processor::{OrderProcessor, SentinelProcessor};
pub use worker::{DeadLetterReason, MessageOutcome, OrderWorker};
