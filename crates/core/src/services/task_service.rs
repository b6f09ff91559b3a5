use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ProcessorError, ProcessorResult};
use crate::models::{NewTask, StreamMessage, Task, TaskQuery, TaskStatus, TaskType, TaskUpdate};
use crate::traits::{BrokerStream, TaskStore};

/// 任务服务
///
/// 生产端入口：创建并发布任务、查询、取消。
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn BrokerStream>,
    stream_name: String,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        broker: Arc<dyn BrokerStream>,
        stream_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            broker,
            stream_name: stream_name.into(),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// 持久化一个 PENDING 任务并发布其 ID
    ///
    /// 发布失败时任务记录已存在但不会被消费，错误原样返回给调用方。
    pub async fn create_and_publish(
        &self,
        task_type: TaskType,
        parameters: Value,
    ) -> ProcessorResult<Task> {
        if !parameters.is_object() {
            return Err(ProcessorError::InvalidTaskParams(
                "parameters must be a JSON object".to_string(),
            ));
        }

        let task = self
            .store
            .create(&NewTask::pending(task_type, parameters))
            .await?;

        match self
            .broker
            .publish(&self.stream_name, &StreamMessage::task_fields(task.id))
            .await
        {
            Ok(message_id) => {
                info!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    message_id = %message_id,
                    "Task created and published"
                );
                Ok(task)
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Task stored but publishing failed");
                Err(e)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> ProcessorResult<Task> {
        self.store.get(id).await
    }

    /// 分页查询任务，同时返回满足状态过滤的总数
    pub async fn list(&self, query: &TaskQuery) -> ProcessorResult<(Vec<Task>, i64)> {
        query.order()?;
        let tasks = self.store.list(query).await?;
        let total = self.store.count(query.statuses.as_deref()).await?;
        Ok((tasks, total))
    }

    /// 取消 PENDING 或 PROCESSING 状态的任务
    ///
    /// 已在执行中的处理器不会被中断，但其结果不会覆盖 CANCELED。
    pub async fn cancel(&self, id: Uuid) -> ProcessorResult<Task> {
        let update = TaskUpdate::canceled(Utc::now());
        if let Some(task) = self
            .store
            .update_if_status(id, &TaskStatus::CANCELABLE, &update)
            .await?
        {
            info!(task_id = %id, "Task canceled");
            return Ok(task);
        }

        let current = self.store.get(id).await?;
        Err(ProcessorError::CancellationRejected {
            id: id.to_string(),
            current: current.status,
            allowed: TaskStatus::CANCELABLE.to_vec(),
        })
    }
}
