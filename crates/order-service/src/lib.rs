//! 订单接入与结果查询服务
//!
//! 两个薄封装：接入服务把订单序列化后发布到订单 topic，
//! 查询服务按 id 从结果存储读取并反序列化处理结果。
//! 服务契约以显式 trait 定义，由具体类型完整实现；`grpc` 模块把它们暴露为
//! `OrderService` 与 `CacheService` 两个 gRPC 服务。

pub mod error;
pub mod grpc;
pub mod intake;
pub mod result;

pub use error::ServiceError;
pub use grpc::{CacheGrpcService, OrderGrpcService};
pub use intake::{KafkaOrderIntake, OrderAccepted, OrderIntake};
pub use result::{OrderResultQuery, StoreResultQuery};
