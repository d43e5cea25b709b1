//! 服务层错误类型
//!
//! 面向调用方的错误分类，一一对应 gRPC 状态码。

use order_shared::error::OrderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    #[error("订单结果未找到: id={id}")]
    NotFound { id: String },

    #[error("依赖服务不可用: {0}")]
    Unavailable(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Kafka(_) => Self::Unavailable(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ServiceError> for tonic::Status {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidArgument { .. } => tonic::Status::invalid_argument(message),
            ServiceError::NotFound { .. } => tonic::Status::not_found(message),
            ServiceError::Unavailable(_) => tonic::Status::unavailable(message),
            ServiceError::Internal(_) => tonic::Status::internal(message),
        }
    }
}
