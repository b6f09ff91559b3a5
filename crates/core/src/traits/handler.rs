use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HandlerError;
use crate::models::{Task, TaskType};

/// 处理器的执行结果，`Ok(None)` 表示成功但无返回值
pub type HandlerOutput = Result<Option<Value>, HandlerError>;

/// 任务处理器
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn handle(&self, task: &Task) -> HandlerOutput;
}
