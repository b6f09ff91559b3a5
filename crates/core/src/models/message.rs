use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ProcessorError, ProcessorResult};

/// 流消息中携带任务 ID 的字段名
pub const TASK_ID_FIELD: &str = "task_id";

/// 从流中读取到的一条消息
///
/// `id` 为 broker 分配的条目 ID（如 `1700000000000-0`），`fields` 为原始字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamMessage {
    pub fn new(id: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// 发布任务时使用的字段
    pub fn task_fields(task_id: Uuid) -> Vec<(String, String)> {
        vec![(TASK_ID_FIELD.to_string(), task_id.to_string())]
    }

    pub fn raw_task_id(&self) -> Option<&str> {
        self.fields.get(TASK_ID_FIELD).map(String::as_str)
    }

    pub fn task_id(&self) -> ProcessorResult<Uuid> {
        let raw = self.raw_task_id().ok_or_else(|| {
            ProcessorError::Validation(format!(
                "Message {} has no {TASK_ID_FIELD} field",
                self.id
            ))
        })?;
        Uuid::parse_str(raw).map_err(|e| {
            ProcessorError::Validation(format!(
                "Message {} carries invalid task id {raw}: {e}",
                self.id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parsing() {
        let task_id = Uuid::new_v4();
        let message = StreamMessage::new("1-0", StreamMessage::task_fields(task_id).into_iter().collect());
        assert_eq!(message.task_id().unwrap(), task_id);

        let missing = StreamMessage::new("2-0", HashMap::new());
        assert!(missing.task_id().is_err());

        let garbage = StreamMessage::new(
            "3-0",
            HashMap::from([(TASK_ID_FIELD.to_string(), "not-a-uuid".to_string())]),
        );
        assert!(matches!(garbage.task_id(), Err(ProcessorError::Validation(_))));
    }
}
