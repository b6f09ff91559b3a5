use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const TASK_QUEUE_NAME: &str = "Task_processing_system:task_queue";
pub const DEFAULT_GROUP_NAME: &str = "default_group";

/// 消费者配置
///
/// - `max_retry_count`: 连续 broker 故障超过该次数后消费循环退出
/// - `min_idle_time_ms`: 待处理消息空闲超过该时长才可被认领
/// - `block_time_ms`: 读取新消息的最长阻塞时间
/// - `batch_count`: 单次读取或认领的最大条数
/// - `backoff_unit_ms`: 退避时间单位，第 n 次失败后等待 `(2^n - 1)` 个单位
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub enabled: bool,
    pub stream_name: String,
    pub group_name: String,
    pub max_retry_count: u32,
    pub min_idle_time_ms: u64,
    pub block_time_ms: u64,
    pub batch_count: usize,
    pub backoff_unit_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stream_name: TASK_QUEUE_NAME.to_string(),
            group_name: DEFAULT_GROUP_NAME.to_string(),
            max_retry_count: 3,
            min_idle_time_ms: 10_000,
            block_time_ms: 3_000,
            batch_count: 1,
            backoff_unit_ms: 1_000,
        }
    }
}

impl ConsumerConfig {
    pub fn min_idle_time(&self) -> Duration {
        Duration::from_millis(self.min_idle_time_ms)
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stream_name.is_empty() {
            return Err(anyhow::anyhow!("任务流名称不能为空"));
        }

        if self.group_name.is_empty() {
            return Err(anyhow::anyhow!("消费者组名称不能为空"));
        }

        if self.batch_count == 0 {
            return Err(anyhow::anyhow!("单次读取条数必须大于0"));
        }

        // BLOCK 0 表示无限阻塞
        if self.block_time_ms == 0 {
            return Err(anyhow::anyhow!("阻塞读取时间必须大于0"));
        }

        Ok(())
    }
}
