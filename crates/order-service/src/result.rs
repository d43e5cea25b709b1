//! 订单结果查询服务

use std::sync::Arc;

use async_trait::async_trait;
use order_shared::cache::KeyValueStore;
use order_shared::order::{ProcessingResult, result_key};
use tracing::{debug, error};

use crate::error::ServiceError;

/// 结果查询契约
#[async_trait]
pub trait OrderResultQuery: Send + Sync {
    async fn get_order_result(&self, order_id: &str) -> Result<ProcessingResult, ServiceError>;
}

/// 直接读取结果存储的查询实现，自身不做缓存
pub struct StoreResultQuery {
    store: Arc<dyn KeyValueStore>,
}

impl StoreResultQuery {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OrderResultQuery for StoreResultQuery {
    async fn get_order_result(&self, order_id: &str) -> Result<ProcessingResult, ServiceError> {
        let key = result_key(order_id);

        let raw = self.store.get(&key).await.map_err(|e| {
            error!(key = %key, error = %e, "读取订单结果失败");
            ServiceError::Internal(format!("存储读取失败: {e}"))
        })?;

        let Some(raw) = raw else {
            debug!(key = %key, "订单结果不存在");
            return Err(ServiceError::NotFound {
                id: order_id.to_string(),
            });
        };

        ProcessingResult::from_json(&raw).map_err(|e| {
            error!(key = %key, error = %e, "订单结果反序列化失败");
            ServiceError::Internal(e.to_string())
        })
    }
}
