use std::sync::Arc;
use std::time::Duration;

use processor_core::{ProcessorError, ProcessorResult, StreamMessage};
use redis::streams::{StreamAutoClaimReply, StreamId, StreamInfoGroupsReply, StreamReadReply};
use redis::RedisError;
use tracing::{debug, info};

use super::connection_manager::RedisConnectionManager;

/// Redis Stream 消费者组命令封装
pub struct RedisStreamOperations {
    connection_manager: Arc<RedisConnectionManager>,
}

impl RedisStreamOperations {
    pub fn new(connection_manager: Arc<RedisConnectionManager>) -> Self {
        Self { connection_manager }
    }

    /// `XINFO GROUPS`，流不存在时视为没有任何组
    pub async fn group_exists(&self, stream_name: &str, group_name: &str) -> ProcessorResult<bool> {
        let mut cmd = redis::cmd("XINFO");
        cmd.arg("GROUPS").arg(stream_name);

        match self
            .connection_manager
            .query::<StreamInfoGroupsReply>("xinfo_groups", &cmd, Duration::ZERO)
            .await?
        {
            Ok(reply) => Ok(reply.groups.iter().any(|g| g.name == group_name)),
            Err(e) if is_no_such_key(&e) => Ok(false),
            Err(e) => Err(ProcessorError::Broker(format!(
                "Failed to inspect consumer groups of {stream_name}: {e}"
            ))),
        }
    }

    /// 组不存在时以 `$` 为起点创建，只消费创建之后的消息
    pub async fn ensure_consumer_group_exists(
        &self,
        stream_name: &str,
        group_name: &str,
    ) -> ProcessorResult<()> {
        if self.group_exists(stream_name, group_name).await? {
            debug!("Consumer group {} already exists", group_name);
            return Ok(());
        }

        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE")
            .arg(stream_name)
            .arg(group_name)
            .arg("$")
            .arg("MKSTREAM");

        match self
            .connection_manager
            .query::<()>("xgroup_create", &cmd, Duration::ZERO)
            .await?
        {
            Ok(()) => {
                info!(
                    "Created consumer group {} on stream {}",
                    group_name, stream_name
                );
                Ok(())
            }
            // 另一个消费者抢先创建
            Err(e) if is_busy_group(&e) => {
                debug!("Consumer group {} already exists", group_name);
                Ok(())
            }
            Err(e) => Err(ProcessorError::Broker(format!(
                "Failed to create consumer group {group_name}: {e}"
            ))),
        }
    }

    /// `XAUTOCLAIM <stream> <group> <consumer> <min-idle> 0-0 COUNT <n>`
    pub async fn auto_claim(
        &self,
        stream_name: &str,
        group_name: &str,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        let mut cmd = redis::cmd("XAUTOCLAIM");
        cmd.arg(stream_name)
            .arg(group_name)
            .arg(consumer_name)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count);

        let reply: StreamAutoClaimReply = self
            .connection_manager
            .execute_command("xautoclaim", &cmd)
            .await?;

        let messages: Vec<StreamMessage> = reply.claimed.into_iter().map(to_stream_message).collect();
        if !messages.is_empty() {
            debug!(
                "Claimed {} stale messages from {} for {}",
                messages.len(),
                stream_name,
                consumer_name
            );
        }
        Ok(messages)
    }

    /// `XREADGROUP GROUP <group> <consumer> COUNT <n> [BLOCK <ms>] STREAMS <stream> >`
    pub async fn read_group(
        &self,
        stream_name: &str,
        group_name: &str,
        consumer_name: &str,
        block: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group_name)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count);
        // BLOCK 0 会无限阻塞，零时长改为非阻塞读取
        let block_ms = block.as_millis() as u64;
        if block_ms > 0 {
            cmd.arg("BLOCK").arg(block_ms);
        }
        cmd.arg("STREAMS")
            .arg(stream_name)
            .arg(">");

        // 阻塞超时返回 nil
        let reply: Option<StreamReadReply> = self
            .connection_manager
            .query("xreadgroup", &cmd, block)
            .await?
            .map_err(|e| ProcessorError::Broker(format!("Redis xreadgroup failed: {e}")))?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(to_stream_message)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn ack(
        &self,
        stream_name: &str,
        group_name: &str,
        message_id: &str,
    ) -> ProcessorResult<()> {
        let mut cmd = redis::cmd("XACK");
        cmd.arg(stream_name).arg(group_name).arg(message_id);

        let acked: i64 = self.connection_manager.execute_command("xack", &cmd).await?;
        if acked == 0 {
            debug!("Message {} was already acknowledged", message_id);
        }
        Ok(())
    }

    pub async fn add(&self, stream_name: &str, fields: &[(String, String)]) -> ProcessorResult<String> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream_name).arg("*");
        for (key, value) in fields {
            cmd.arg(key).arg(value);
        }

        let message_id: String = self.connection_manager.execute_command("xadd", &cmd).await?;
        debug!("Published message {} to stream {}", message_id, stream_name);
        Ok(message_id)
    }
}

fn to_stream_message(entry: StreamId) -> StreamMessage {
    let fields = entry
        .map
        .iter()
        .filter_map(|(key, value)| {
            redis::from_redis_value::<String>(value)
                .ok()
                .map(|v| (key.clone(), v))
        })
        .collect();
    StreamMessage::new(entry.id, fields)
}

fn is_busy_group(err: &RedisError) -> bool {
    err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP")
}

fn is_no_such_key(err: &RedisError) -> bool {
    err.to_string().to_lowercase().contains("no such key")
}
