//! 工作者错误类型
//!
//! 区分业务处理失败（进入有界重试）与基础设施错误（仅记录日志）。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("订单处理失败: order_id={order_id}, 原因={reason}")]
    ProcessingFailed { order_id: String, reason: String },

    #[error(transparent)]
    Shared(#[from] order_shared::error::OrderError),
}
