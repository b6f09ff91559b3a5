use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use processor_core::TaskService;

use crate::handlers::{
    health::health_check,
    metrics::render_metrics,
    tasks::{cancel_task, create_task, get_task, list_tasks},
};

pub const API_V1_PREFIX: &str = "/api/v1";

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: TaskService,
    pub metrics: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    let tasks = Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/cancel", post(cancel_task));

    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .nest(API_V1_PREFIX, tasks)
        .with_state(state)
}
