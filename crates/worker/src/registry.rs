use std::collections::HashMap;
use std::sync::Arc;

use processor_core::{ProcessorError, ProcessorResult, TaskHandler, TaskType};
use tracing::{debug, warn};

use crate::handlers::SleepHandler;

/// 任务类型到处理器的映射
///
/// 启动时注册完成，运行期只读。
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册所有内置处理器
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SleepHandler::default()));
        registry
    }

    /// 同一类型重复注册时后者覆盖前者
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let task_type = handler.task_type();
        if self.handlers.insert(task_type, handler).is_some() {
            warn!("Handler for task type {} replaced", task_type);
        } else {
            debug!("Registered handler for task type {}", task_type);
        }
    }

    pub fn resolve(&self, task_type: TaskType) -> ProcessorResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(&task_type)
            .cloned()
            .ok_or(ProcessorError::HandlerNotFound { task_type })
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use processor_core::{HandlerOutput, Task};
    use serde_json::json;

    struct FixedHandler(serde_json::Value);

    #[async_trait]
    impl TaskHandler for FixedHandler {
        fn task_type(&self) -> TaskType {
            TaskType::Sleep
        }

        async fn handle(&self, _task: &Task) -> HandlerOutput {
            Ok(Some(self.0.clone()))
        }
    }

    #[test]
    fn test_empty_registry_rejects_unknown_type() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve(TaskType::Sleep),
            Err(ProcessorError::HandlerNotFound {
                task_type: TaskType::Sleep
            })
        ));
    }

    #[test]
    fn test_builtin_handlers() {
        let registry = HandlerRegistry::with_builtin_handlers();
        assert_eq!(registry.task_types(), vec![TaskType::Sleep]);
        assert!(registry.resolve(TaskType::Sleep).is_ok());
    }

    #[tokio::test]
    async fn test_register_replaces_existing() {
        let mut registry = HandlerRegistry::with_builtin_handlers();
        registry.register(Arc::new(FixedHandler(json!("replaced"))));
        assert_eq!(registry.len(), 1);

        let task = processor_core::NewTask::pending(TaskType::Sleep, json!({}))
            .into_task(uuid::Uuid::new_v4(), chrono::Utc::now());
        let output = registry
            .resolve(TaskType::Sleep)
            .unwrap()
            .handle(&task)
            .await
            .unwrap();
        assert_eq!(output, Some(json!("replaced")));
    }
}
