//! 订单接入服务
//!
//! 校验 id 存在后将订单序列化为 JSON 发布到订单 topic。
//! 不做去重，发布成功即返回 accepted。

use std::sync::Arc;

use async_trait::async_trait;
use order_shared::config::AppConfig;
use order_shared::kafka::{MessagePublisher, ProducerMessage};
use order_shared::order::OrderMessage;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::ServiceError;

/// 接入确认
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderAccepted {
    pub status: String,
}

impl OrderAccepted {
    pub fn accepted() -> Self {
        Self {
            status: "accepted".to_string(),
        }
    }
}

/// 订单接入契约
#[async_trait]
pub trait OrderIntake: Send + Sync {
    async fn create_order(&self, order: OrderMessage) -> Result<OrderAccepted, ServiceError>;
}

/// 基于 Kafka 的接入实现
pub struct KafkaOrderIntake {
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
}

impl KafkaOrderIntake {
    pub fn new(config: &AppConfig, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            publisher,
            topic: config.kafka.order_topic.clone(),
        }
    }
}

#[async_trait]
impl OrderIntake for KafkaOrderIntake {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_order(&self, order: OrderMessage) -> Result<OrderAccepted, ServiceError> {
        if order.id.is_empty() {
            return Err(ServiceError::InvalidArgument {
                field: "id".to_string(),
                message: "订单 id 不能为空".to_string(),
            });
        }

        let payload = order.to_payload()?;
        // 以订单 id 作为消息键，同一订单落在同一分区
        let message = ProducerMessage::new(payload).with_key(order.id.as_bytes());

        let (partition, offset) = self
            .publisher
            .publish(&self.topic, message)
            .await
            .map_err(|e| {
                warn!(error = %e, "订单发布失败");
                ServiceError::from(e)
            })?;

        info!(topic = %self.topic, partition, offset, "订单已接收");
        Ok(OrderAccepted::accepted())
    }
}
