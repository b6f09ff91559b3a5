//! # Processor API
//!
//! 任务处理系统的 HTTP 接口：提交任务、查询任务、取消任务。
//!
//! ## API 端点
//!
//! - `GET /health` - 存活检查，返回 204
//! - `GET /metrics` - Prometheus 指标
//! - `POST /api/v1/tasks` - 创建任务并投递到任务队列
//! - `GET /api/v1/tasks` - 任务列表，支持 `offset`、`limit`、`order_by`、`status`
//! - `GET /api/v1/tasks/{id}` - 任务详情
//! - `POST /api/v1/tasks/{id}/cancel` - 取消任务
//!
//! 错误统一返回 `{detail, code, parameters}`，HTTP 状态码取自错误码表。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::{http::HeaderValue, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use processor_core::config::ApiConfig;
use processor_core::TaskService;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::warn;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};

use middleware::{app_version, cors_layer, trace_layer};

/// 创建完整的API应用
pub fn create_app(
    service: TaskService,
    api_config: &ApiConfig,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let version = HeaderValue::from_str(&api_config.app_version).unwrap_or_else(|_| {
        warn!("Invalid app version {:?}, using 'unknown'", api_config.app_version);
        HeaderValue::from_static("unknown")
    });

    let router = create_routes(AppState { service, metrics }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn_with_state(version, app_version))
            .layer(CatchPanicLayer::custom(error::panic_response)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer(&api_config.cors_origins))
    } else {
        router
    }
}
