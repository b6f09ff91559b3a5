use std::time::Duration;

use async_trait::async_trait;

use crate::models::StreamMessage;
use crate::ProcessorResult;

/// 支持消费者组语义的消息流抽象接口
///
/// 已投递但未确认的消息保留在组的待处理列表中，空闲超过阈值后可被
/// 同组其他消费者认领。
#[async_trait]
pub trait BrokerStream: Send + Sync {
    /// 确保消费者组存在，流不存在时一并创建；组已存在视为成功
    async fn ensure_group(&self, stream: &str, group: &str) -> ProcessorResult<()>;

    /// 认领空闲时间不少于 `min_idle` 的待处理消息
    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>>;

    /// 读取从未投递过的新消息，最多阻塞 `block`
    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>>;

    /// 确认消息，重复确认无副作用
    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> ProcessorResult<()>;

    /// 追加消息，返回 broker 分配的条目 ID
    async fn publish(&self, stream: &str, fields: &[(String, String)]) -> ProcessorResult<String>;
}
