//! Redis Streams 消费者组实现
//!
//! - `config`: 连接配置
//! - `connection_manager`: 自动重连的异步连接与命令超时
//! - `stream_operations`: XGROUP / XAUTOCLAIM / XREADGROUP / XACK / XADD 封装

pub mod config;
pub mod connection_manager;
pub mod stream_operations;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use processor_core::{BrokerStream, ProcessorResult, StreamMessage};

pub use config::RedisStreamConfig;
pub use connection_manager::RedisConnectionManager;
pub use stream_operations::RedisStreamOperations;

/// 基于 Redis Streams 的 [`BrokerStream`] 实现
///
/// 仅支持单节点 Redis。阻塞读取会占用底层连接，生产端和消费端应各自持有实例。
pub struct RedisStreamBroker {
    connection_manager: Arc<RedisConnectionManager>,
    operations: RedisStreamOperations,
}

impl RedisStreamBroker {
    pub async fn new(config: RedisStreamConfig) -> ProcessorResult<Self> {
        let connection_manager = Arc::new(RedisConnectionManager::new(config).await?);
        let operations = RedisStreamOperations::new(connection_manager.clone());
        Ok(Self {
            connection_manager,
            operations,
        })
    }

    pub async fn health_check(&self) -> bool {
        self.connection_manager.health_check().await
    }
}

#[async_trait]
impl BrokerStream for RedisStreamBroker {
    async fn ensure_group(&self, stream: &str, group: &str) -> ProcessorResult<()> {
        self.operations
            .ensure_consumer_group_exists(stream, group)
            .await
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        self.operations
            .auto_claim(stream, group, consumer, min_idle, count)
            .await
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        self.operations
            .read_group(stream, group, consumer, block, count)
            .await
    }

    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> ProcessorResult<()> {
        self.operations.ack(stream, group, message_id).await
    }

    async fn publish(&self, stream: &str, fields: &[(String, String)]) -> ProcessorResult<String> {
        self.operations.add(stream, fields).await
    }
}
