use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use processor_core::models::DEFAULT_ORDER_BY;
use processor_core::{Task, TaskQuery, TaskStatus, TaskType};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::{error::ApiResult, response::ListResponse, routes::AppState};

/// 任务创建请求
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn empty_parameters() -> Value {
    Value::Object(Map::new())
}

/// 任务查询参数
#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    #[serde(default)]
    pub offset: u64,
    /// 0 表示返回全部
    #[serde(default)]
    pub limit: u64,
    #[serde(default = "default_order_by")]
    pub order_by: String,
    /// 逗号分隔，例如 `PENDING,PROCESSING`
    pub status: Option<String>,
}

fn default_order_by() -> String {
    DEFAULT_ORDER_BY.to_string()
}

impl ListTasksParams {
    pub fn into_query(self) -> ApiResult<TaskQuery> {
        let statuses = self
            .status
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::parse::<TaskStatus>)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(TaskQuery {
            offset: self.offset,
            limit: self.limit,
            order_by: self.order_by,
            statuses,
        })
    }
}

/// 创建任务并投递到任务队列
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let Json(request) = payload?;
    let task = state
        .service
        .create_and_publish(request.task_type, request.parameters)
        .await?;
    info!(task_id = %task.id, task_type = %task.task_type, "Task submitted");
    Ok(Json(task))
}

/// 获取任务列表
pub async fn list_tasks(
    State(state): State<AppState>,
    params: Result<Query<ListTasksParams>, QueryRejection>,
) -> ApiResult<ListResponse<Task>> {
    let Query(params) = params?;
    let query = params.into_query()?;
    let (tasks, total) = state.service.list(&query).await?;
    Ok(ListResponse::new(tasks, total))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Task>> {
    let Path(id) = id?;
    Ok(Json(state.service.get(id).await?))
}

/// 取消任务，只允许 PENDING 和 PROCESSING 状态
pub async fn cancel_task(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Task>> {
    let Path(id) = id?;
    let task = state.service.cancel(id).await?;
    info!(task_id = %task.id, "Task canceled");
    Ok(Json(task))
}
