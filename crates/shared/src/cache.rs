//! Redis 结果存储
//!
//! 提供 `KeyValueStore` 抽象及其 Redis 实现。值以原始字符串写入，
//! 不设置过期时间，同一个键后写覆盖先写。

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{info, instrument};

use crate::config::RedisConfig;
use crate::error::{OrderError, Result};

/// 字符串键值存储
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端，不会立即建立连接
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let url = config.connection_url();
        let client = Client::open(url.as_str())?;
        info!(addr = %config.addr, "Redis client created");
        Ok(Self { client })
    }

    /// 获取连接
    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(OrderError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(OrderError::from)
    }
}

#[async_trait]
impl KeyValueStore for Cache {
    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}
