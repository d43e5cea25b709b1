//! 订单领域模型
//!
//! 定义在 Kafka 负载与 Redis 存储中流转的订单消息和处理结果。

use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

/// 结果存储键前缀
pub const RESULT_KEY_PREFIX: &str = "order:";

/// 订单消息，由接入服务序列化后写入订单主 topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    pub id: String,
    pub item: String,
    pub price: i64,
}

impl OrderMessage {
    pub fn new(id: impl Into<String>, item: impl Into<String>, price: i64) -> Self {
        Self {
            id: id.into(),
            item: item.into(),
            price,
        }
    }

    /// 从队列负载解析订单
    ///
    /// 空 id 会生成无意义的存储键 `order:`，与 JSON 结构错误一样视为负载无效；
    /// 除此之外不对 id 做任何校验。
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let order: Self = serde_json::from_slice(payload)
            .map_err(|e| OrderError::MalformedPayload(e.to_string()))?;

        if order.id.is_empty() {
            return Err(OrderError::MalformedPayload("订单 id 为空".to_string()));
        }

        Ok(order)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| OrderError::Serialization(e.to_string()))
    }

    /// 该订单处理结果在存储中的键
    pub fn result_key(&self) -> String {
        result_key(&self.id)
    }
}

/// 构造 `order:<id>` 存储键
pub fn result_key(order_id: &str) -> String {
    format!("{RESULT_KEY_PREFIX}{order_id}")
}

/// 处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Done,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
        }
    }
}

/// 订单处理结果，以 JSON 文本写入存储便于直接排查
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub item: String,
    pub price: i64,
    pub status: ResultStatus,
}

impl ProcessingResult {
    /// 为成功处理的订单生成结果
    pub fn done(order: &OrderMessage) -> Self {
        Self {
            item: order.item.clone(),
            price: order.price,
            status: ResultStatus::Done,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| OrderError::Serialization(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| OrderError::Serialization(e.to_string()))
    }
}
