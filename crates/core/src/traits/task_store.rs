use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewTask, Task, TaskQuery, TaskStatus, TaskUpdate};
use crate::ProcessorResult;

/// 任务存储抽象接口
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 创建任务，`created_at` 与 `updated_at` 由存储层写入
    async fn create(&self, task: &NewTask) -> ProcessorResult<Task>;

    /// 按 ID 获取任务，不存在时返回 `TaskNotFound`
    async fn get(&self, id: Uuid) -> ProcessorResult<Task>;

    /// 无条件部分更新
    async fn update(&self, id: Uuid, update: &TaskUpdate) -> ProcessorResult<Task>;

    /// 仅当任务当前状态属于 `expected` 时才更新
    ///
    /// 状态不匹配时返回 `Ok(None)`，任务不存在时返回 `TaskNotFound`。
    async fn update_if_status(
        &self,
        id: Uuid,
        expected: &[TaskStatus],
        update: &TaskUpdate,
    ) -> ProcessorResult<Option<Task>>;

    async fn list(&self, query: &TaskQuery) -> ProcessorResult<Vec<Task>>;

    async fn count(&self, statuses: Option<&[TaskStatus]>) -> ProcessorResult<i64>;
}
