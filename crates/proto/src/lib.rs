//! 订单管道 gRPC 协议定义
//!
//! 由 build.rs 从 `proto/order.proto` 生成消息类型、服务端 trait 与客户端。

pub mod order {
    tonic::include_proto!("order");
}
