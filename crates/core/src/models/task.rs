use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{HandlerError, ProcessorError};

/// 任务状态
///
/// 状态机：
///
/// ```text
/// PENDING ──> PROCESSING ──> COMPLETED
///    │            │    └───> FAILED
///    └────────────┴────────> CANCELED
/// ```
///
/// COMPLETED、FAILED、CANCELED 为终止状态，进入后不再变化。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Canceled,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Canceled,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// 允许取消的状态
    pub const CANCELABLE: [TaskStatus; 2] = [TaskStatus::Pending, TaskStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Canceled => "CANCELED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Canceled | TaskStatus::Completed | TaskStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Canceled)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Canceled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ProcessorError::Validation(format!("Unknown task status: {s}")))
    }
}

/// 任务类型，每种类型由一个处理器负责执行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Sleep,
}

impl TaskType {
    pub const ALL: [TaskType; 1] = [TaskType::Sleep];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Sleep => "SLEEP",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProcessorError::Validation(format!("Unknown task type: {s}")))
    }
}

/// 任务记录
///
/// - `parameters`: 处理器的输入参数，JSON 对象
/// - `result`: 处理器成功时的返回值
/// - `error_code` / `error_message`: 失败时记录
/// - `started_at`: 进入 PROCESSING 时写入
/// - `ended_at`: 进入终止状态时写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub parameters: Value,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 新建任务的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl NewTask {
    pub fn pending(task_type: TaskType, parameters: Value) -> Self {
        Self {
            task_type,
            status: TaskStatus::Pending,
            parameters,
        }
    }

    /// Builds the full record, stamping both timestamps with `now`.
    pub fn into_task(self, id: Uuid, now: DateTime<Utc>) -> Task {
        Task {
            id,
            task_type: self.task_type,
            parameters: self.parameters,
            status: self.status,
            result: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
        }
    }
}

/// 任务部分更新
///
/// 为 `None` 的字段保持原值。`updated_at` 由存储层在每次写入时刷新。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<Value>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn processing(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Processing),
            started_at: Some(now),
            ..Default::default()
        }
    }

    pub fn completed(result: Option<Value>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            result,
            ended_at: Some(now),
            ..Default::default()
        }
    }

    pub fn failed(error: &HandlerError, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            error_code: Some(error.code()),
            error_message: Some(error.message.clone()),
            ended_at: Some(now),
            ..Default::default()
        }
    }

    pub fn canceled(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Canceled),
            ended_at: Some(now),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskUpdate::default()
    }

    /// 将更新应用到内存中的任务
    pub fn apply_to(&self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(result) = &self.result {
            task.result = Some(result.clone());
        }
        if let Some(code) = self.error_code {
            task.error_code = Some(code);
        }
        if let Some(message) = &self.error_message {
            task.error_message = Some(message.clone());
        }
        if let Some(started_at) = self.started_at {
            task.started_at = Some(started_at);
        }
        if let Some(ended_at) = self.ended_at {
            task.ended_at = Some(ended_at);
        }
        task.updated_at = now;
    }
}
