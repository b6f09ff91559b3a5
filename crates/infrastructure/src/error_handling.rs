//! Context-rich error helpers for task store operations

use std::fmt;

use processor_core::ProcessorError;
use sqlx::Error as SqlxError;
use tracing::{error, warn};
use uuid::Uuid;

/// Operation context for store operations
#[derive(Debug, Clone, Copy)]
pub enum StoreOperation {
    Create,
    Read,
    Update,
    ConditionalUpdate,
    Query,
    Count,
    Migrate,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOperation::Create => write!(f, "创建"),
            StoreOperation::Read => write!(f, "查询"),
            StoreOperation::Update => write!(f, "更新"),
            StoreOperation::ConditionalUpdate => write!(f, "条件更新"),
            StoreOperation::Query => write!(f, "列表查询"),
            StoreOperation::Count => write!(f, "计数"),
            StoreOperation::Migrate => write!(f, "迁移"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaskOperationContext {
    pub operation: StoreOperation,
    pub task_id: Option<Uuid>,
}

impl TaskOperationContext {
    pub fn new(operation: StoreOperation) -> Self {
        Self {
            operation,
            task_id: None,
        }
    }

    pub fn with_task_id(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn entity_description(&self) -> String {
        match self.task_id {
            Some(id) => format!("任务 (ID: {id})"),
            None => "任务".to_string(),
        }
    }

    /// Logs the failure and converts it into a store error.
    pub fn database_error(&self, err: SqlxError) -> ProcessorError {
        match &err {
            SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
                warn!(
                    operation = %self.operation,
                    "{}{}时数据库不可用: {}",
                    self.entity_description(),
                    self.operation,
                    err
                );
            }
            _ => {
                error!(
                    operation = %self.operation,
                    "{}{}失败: {}",
                    self.entity_description(),
                    self.operation,
                    err
                );
            }
        }
        ProcessorError::Database(err)
    }

    pub fn serialization_error(&self, err: serde_json::Error) -> ProcessorError {
        error!(
            operation = %self.operation,
            "{}{}时序列化失败: {}",
            self.entity_description(),
            self.operation,
            err
        );
        ProcessorError::Serialization(err.to_string())
    }
}

#[macro_export]
macro_rules! task_context {
    ($op:expr) => {
        $crate::error_handling::TaskOperationContext::new($op)
    };
    ($op:expr, $id:expr) => {
        $crate::error_handling::TaskOperationContext::new($op).with_task_id($id)
    };
}
