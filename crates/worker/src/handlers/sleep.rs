use std::time::Duration;

use async_trait::async_trait;
use processor_core::{HandlerError, HandlerOutput, ProcessorError, Task, TaskHandler, TaskType};
use serde_json::{json, Value};
use tracing::info;

pub const DEFAULT_SLEEP_SECONDS: u64 = 3;

/// 休眠指定秒数，参数 `seconds` 缺省为 3
#[derive(Debug, Clone)]
pub struct SleepHandler {
    default_seconds: u64,
}

impl SleepHandler {
    pub fn new(default_seconds: u64) -> Self {
        Self { default_seconds }
    }

    fn seconds(&self, task: &Task) -> Result<u64, HandlerError> {
        match task.parameters.get("seconds") {
            None | Some(Value::Null) => Ok(self.default_seconds),
            Some(value) => value.as_u64().ok_or_else(|| {
                ProcessorError::InvalidTaskParams(format!(
                    "seconds must be a non-negative integer, got {value}"
                ))
                .into()
            }),
        }
    }
}

impl Default for SleepHandler {
    fn default() -> Self {
        Self::new(DEFAULT_SLEEP_SECONDS)
    }
}

#[async_trait]
impl TaskHandler for SleepHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Sleep
    }

    async fn handle(&self, task: &Task) -> HandlerOutput {
        let seconds = self.seconds(task)?;
        info!(task_id = %task.id, "Sleeping for {} seconds", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        Ok(Some(json!({ "slept_seconds": seconds })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use processor_core::NewTask;
    use uuid::Uuid;

    fn task(parameters: Value) -> Task {
        NewTask::pending(TaskType::Sleep, parameters).into_task(Uuid::new_v4(), Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_duration() {
        let start = tokio::time::Instant::now();
        let output = SleepHandler::default().handle(&task(json!({}))).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(output, Some(json!({ "slept_seconds": 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_duration() {
        let output = SleepHandler::default()
            .handle(&task(json!({ "seconds": 0 })))
            .await
            .unwrap();
        assert_eq!(output, Some(json!({ "slept_seconds": 0 })));
    }

    #[tokio::test]
    async fn test_invalid_seconds() {
        let err = SleepHandler::default()
            .handle(&task(json!({ "seconds": "soon" })))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 30001);
        assert!(err.message.contains("seconds"));
    }
}
