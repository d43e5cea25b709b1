//! 重试元数据编解码
//!
//! 重试次数以 `retries` 消息头的十进制字符串形式随消息传递，与负载分离。
//! 两个函数都是纯函数：读取不依赖队列连接，写入返回新的消息头列表。

use crate::kafka::MessageHeader;

/// 承载重试次数的消息头名称
pub const RETRY_HEADER: &str = "retries";

fn is_retry_header(header: &MessageHeader) -> bool {
    header.key.eq_ignore_ascii_case(RETRY_HEADER)
}

/// 读取重试次数
///
/// 按名称大小写不敏感地查找第一个 `retries` 头。缺失或无法解析时返回 0：
/// 损坏的重试元数据不能阻止消息最终进入死信队列。
pub fn read_retry_count(headers: &[MessageHeader]) -> u32 {
    headers
        .iter()
        .find(|h| is_retry_header(h))
        .and_then(|h| std::str::from_utf8(&h.value).ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// 返回写入了新重试次数的消息头列表
///
/// 第一个 `retries` 头原位替换（名称规范化为小写），其后重复的 `retries` 头被丢弃；
/// 不存在时追加到末尾。其余消息头保持原有顺序。
pub fn with_retry_count(headers: &[MessageHeader], count: u32) -> Vec<MessageHeader> {
    let mut result = Vec::with_capacity(headers.len() + 1);
    let mut replaced = false;

    for header in headers {
        if !is_retry_header(header) {
            result.push(header.clone());
        } else if !replaced {
            result.push(retry_header(count));
            replaced = true;
        }
    }

    if !replaced {
        result.push(retry_header(count));
    }
    result
}

fn retry_header(count: u32) -> MessageHeader {
    MessageHeader::new(RETRY_HEADER, count.to_string())
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
