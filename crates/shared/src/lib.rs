//! 共享库
//!
//! 包含订单管道各组件共用的配置、错误处理、Kafka、Redis 存储、
//! 重试元数据编解码以及可观测性等基础设施代码。

pub mod cache;
pub mod config;
pub mod error;
pub mod kafka;
pub mod observability;
pub mod order;
pub mod retry;
pub mod test_utils;
