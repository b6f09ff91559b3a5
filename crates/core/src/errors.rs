use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::error_codes::{ErrorCodeEntry, ErrorKind};
use crate::models::{TaskStatus, TaskType};

/// 任务处理系统错误类型定义
///
/// 每个变体都对应错误码表中的一个稳定数字码，API 层据此生成
/// `{detail, code, parameters}` 形式的错误响应。
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown database error: {0}")]
    Store(String),

    #[error("Message broker error: {0}")]
    Broker(String),

    #[error("The entry: task, id: {id} does not exist.")]
    TaskNotFound { id: String },

    #[error("No handler registered for task type {task_type}")]
    HandlerNotFound { task_type: TaskType },

    #[error(
        "Task {id} cannot be canceled in status {current}, allowed statuses: {}",
        join_statuses(.allowed)
    )]
    CancellationRejected {
        id: String,
        current: TaskStatus,
        allowed: Vec<TaskStatus>,
    },

    #[error("The column {column} does not exist.")]
    InvalidOrderColumn { column: String },

    #[error("The direction {direction} is invalid, must be asc or desc.")]
    InvalidOrderDirection { direction: String },

    #[error("Invalid task parameters: {0}")]
    InvalidTaskParams(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task execution error: {0}")]
    TaskExecution(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type ProcessorResult<T> = std::result::Result<T, ProcessorError>;

fn join_statuses(statuses: &[TaskStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ProcessorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessorError::Database(_) | ProcessorError::Store(_) => ErrorKind::Store,
            ProcessorError::Broker(_) => ErrorKind::Broker,
            ProcessorError::TaskNotFound { .. } => ErrorKind::TaskNotFound,
            ProcessorError::HandlerNotFound { .. } => ErrorKind::HandlerNotFound,
            ProcessorError::CancellationRejected { .. } => ErrorKind::CancellationRejected,
            ProcessorError::InvalidOrderColumn { .. } => ErrorKind::InvalidOrderColumn,
            ProcessorError::InvalidOrderDirection { .. } => ErrorKind::InvalidOrderDirection,
            ProcessorError::InvalidTaskParams(_) => ErrorKind::InvalidTaskParams,
            ProcessorError::Validation(_) => ErrorKind::Validation,
            ProcessorError::TaskExecution(_) => ErrorKind::TaskExecution,
            ProcessorError::Serialization(_) => ErrorKind::Serialization,
            ProcessorError::Configuration(_) => ErrorKind::Configuration,
            ProcessorError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn entry(&self) -> &'static ErrorCodeEntry {
        self.kind().entry()
    }

    /// 稳定的数字错误码
    pub fn code(&self) -> u32 {
        self.entry().code
    }

    pub fn http_status(&self) -> u16 {
        self.entry().http_status
    }

    /// 构造错误时使用的参数，供客户端重建错误
    pub fn parameters(&self) -> Value {
        match self {
            ProcessorError::Database(e) => json!({ "error": e.to_string() }),
            ProcessorError::TaskNotFound { id } => json!({ "entry_name": "task", "id": id }),
            ProcessorError::HandlerNotFound { task_type } => json!({ "task_type": task_type }),
            ProcessorError::CancellationRejected {
                id,
                current,
                allowed,
            } => json!({ "id": id, "current": current, "allowed": allowed }),
            ProcessorError::InvalidOrderColumn { column } => json!({ "column": column }),
            ProcessorError::InvalidOrderDirection { direction } => {
                json!({ "direction": direction })
            }
            ProcessorError::Store(msg)
            | ProcessorError::Broker(msg)
            | ProcessorError::InvalidTaskParams(msg)
            | ProcessorError::Validation(msg)
            | ProcessorError::TaskExecution(msg)
            | ProcessorError::Serialization(msg)
            | ProcessorError::Configuration(msg)
            | ProcessorError::Internal(msg) => json!({ "error": msg }),
        }
    }

    pub fn to_detail(&self) -> ErrorDetail {
        ErrorDetail {
            detail: self.to_string(),
            code: self.code(),
            parameters: self.parameters(),
        }
    }

    /// Rebuilds an error from its wire form.
    pub fn from_detail(detail: &ErrorDetail) -> ProcessorResult<Self> {
        let kind = ErrorKind::from_code(detail.code).ok_or_else(|| {
            ProcessorError::Validation(format!("The error code {} does not exist.", detail.code))
        })?;
        let params = &detail.parameters;
        let text = |key: &str| -> ProcessorResult<String> {
            params
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ProcessorError::Validation(format!(
                        "Cannot instantiate error code {} without parameter {key}",
                        detail.code
                    ))
                })
        };
        let typed = |key: &str| -> ProcessorResult<Value> {
            params.get(key).cloned().ok_or_else(|| {
                ProcessorError::Validation(format!(
                    "Cannot instantiate error code {} without parameter {key}",
                    detail.code
                ))
            })
        };
        let from_json = |e: serde_json::Error| ProcessorError::Serialization(e.to_string());

        let error = match kind {
            ErrorKind::Internal => ProcessorError::Internal(text("error")?),
            ErrorKind::Configuration => ProcessorError::Configuration(text("error")?),
            ErrorKind::Serialization => ProcessorError::Serialization(text("error")?),
            ErrorKind::Store => ProcessorError::Store(text("error")?),
            ErrorKind::TaskNotFound => ProcessorError::TaskNotFound { id: text("id")? },
            ErrorKind::InvalidOrderColumn => ProcessorError::InvalidOrderColumn {
                column: text("column")?,
            },
            ErrorKind::InvalidOrderDirection => ProcessorError::InvalidOrderDirection {
                direction: text("direction")?,
            },
            ErrorKind::Validation => ProcessorError::Validation(text("error")?),
            ErrorKind::InvalidTaskParams => ProcessorError::InvalidTaskParams(text("error")?),
            ErrorKind::Broker => ProcessorError::Broker(text("error")?),
            ErrorKind::TaskExecution => ProcessorError::TaskExecution(text("error")?),
            ErrorKind::HandlerNotFound => ProcessorError::HandlerNotFound {
                task_type: serde_json::from_value(typed("task_type")?).map_err(from_json)?,
            },
            ErrorKind::CancellationRejected => ProcessorError::CancellationRejected {
                id: text("id")?,
                current: serde_json::from_value(typed("current")?).map_err(from_json)?,
                allowed: serde_json::from_value(typed("allowed")?).map_err(from_json)?,
            },
        };
        Ok(error)
    }

    /// 是否是可重试的基础设施错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProcessorError::Database(_) | ProcessorError::Store(_) | ProcessorError::Broker(_)
        )
    }

    pub fn task_not_found(id: impl ToString) -> Self {
        ProcessorError::TaskNotFound { id: id.to_string() }
    }
}

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        ProcessorError::Serialization(err.to_string())
    }
}

/// 错误的线上表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
    pub code: u32,
    #[serde(default)]
    pub parameters: Value,
}

/// 任务处理器返回的错误
///
/// 只携带消息和可选的错误码，未指定错误码时按 1 记录。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub code: Option<i32>,
}

impl HandlerError {
    pub const DEFAULT_CODE: i32 = 1;

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn code(&self) -> i32 {
        self.code.unwrap_or(Self::DEFAULT_CODE)
    }
}

impl From<ProcessorError> for HandlerError {
    fn from(err: ProcessorError) -> Self {
        let code = i32::try_from(err.code()).ok();
        Self {
            message: err.to_string(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_not_found_detail() {
        let err = ProcessorError::task_not_found("abc");
        let detail = err.to_detail();

        assert_eq!(detail.code, 20001);
        assert_eq!(detail.detail, "The entry: task, id: abc does not exist.");
        assert_eq!(detail.parameters["entry_name"], "task");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_cancellation_rejected_message() {
        let err = ProcessorError::CancellationRejected {
            id: "t1".to_string(),
            current: TaskStatus::Completed,
            allowed: vec![TaskStatus::Pending, TaskStatus::Processing],
        };

        assert_eq!(
            err.to_string(),
            "Task t1 cannot be canceled in status COMPLETED, allowed statuses: PENDING, PROCESSING"
        );
        assert_eq!(err.parameters()["allowed"], json!(["PENDING", "PROCESSING"]));
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn test_from_detail_rebuilds_typed_error() {
        let original = ProcessorError::CancellationRejected {
            id: "t1".to_string(),
            current: TaskStatus::Failed,
            allowed: vec![TaskStatus::Pending],
        };

        let rebuilt = ProcessorError::from_detail(&original.to_detail()).unwrap();
        assert_eq!(rebuilt.to_string(), original.to_string());
        assert_eq!(rebuilt.code(), original.code());
    }

    #[test]
    fn test_from_detail_unknown_code() {
        let detail = ErrorDetail {
            detail: "boom".to_string(),
            code: 99999,
            parameters: json!({}),
        };
        let err = ProcessorError::from_detail(&detail).unwrap_err();
        assert!(err.to_string().contains("99999"));
    }

    #[test]
    fn test_from_detail_missing_parameter() {
        let detail = ErrorDetail {
            detail: "missing".to_string(),
            code: 20002,
            parameters: json!({}),
        };
        assert!(matches!(
            ProcessorError::from_detail(&detail),
            Err(ProcessorError::Validation(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProcessorError::Broker("connection refused".into()).is_transient());
        assert!(ProcessorError::Store("pool timed out".into()).is_transient());
        assert!(!ProcessorError::task_not_found("abc").is_transient());
        assert!(!ProcessorError::Validation("bad".into()).is_transient());
    }

    #[test]
    fn test_handler_error_default_code() {
        let err = HandlerError::new("boom");
        assert_eq!(err.code(), 1);
        assert_eq!(err.to_string(), "boom");

        let coded = HandlerError::with_code("bad input", 42);
        assert_eq!(coded.code(), 42);
    }

    #[test]
    fn test_handler_error_from_processor_error() {
        let err: HandlerError = ProcessorError::InvalidTaskParams("seconds".into()).into();
        assert_eq!(err.code(), 30001);
        assert_eq!(err.message, "Invalid task parameters: seconds");
    }
}
