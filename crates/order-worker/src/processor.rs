//! 订单业务处理
//!
//! 通过 `OrderProcessor` trait 抽象"处理一笔订单"的业务规则，工作者只关心
//! 成功与失败两种结果。当前内置的 `SentinelProcessor` 按商品名前缀模拟业务失败，
//! 接入真实处理逻辑时只需实现同一 trait。

use async_trait::async_trait;
use order_shared::order::{OrderMessage, ProcessingResult};
use tracing::debug;

use crate::error::WorkerError;

/// 订单处理器 trait
#[async_trait]
pub trait OrderProcessor: Send + Sync {
    /// 处理订单；返回 Err 表示业务失败，工作者会进入重试流程
    async fn process(&self, order: &OrderMessage) -> Result<ProcessingResult, WorkerError>;
}

/// 按商品名前缀判定失败的处理器
pub struct SentinelProcessor {
    failure_prefix: String,
}

impl SentinelProcessor {
    pub fn new(failure_prefix: impl Into<String>) -> Self {
        Self {
            failure_prefix: failure_prefix.into(),
        }
    }

    fn is_failure(&self, order: &OrderMessage) -> bool {
        order.item.starts_with(&self.failure_prefix)
    }
}

impl Default for SentinelProcessor {
    fn default() -> Self {
        Self::new("fail")
    }
}

#[async_trait]
impl OrderProcessor for SentinelProcessor {
    async fn process(&self, order: &OrderMessage) -> Result<ProcessingResult, WorkerError> {
        if self.is_failure(order) {
            debug!(order_id = %order.id, item = %order.item, "商品命中失败前缀");
            return Err(WorkerError::ProcessingFailed {
                order_id: order.id.clone(),
                reason: format!("商品名以 \"{}\" 开头", self.failure_prefix),
            });
        }

        Ok(ProcessingResult::done(order))
    }
}
