use axum::http::StatusCode;

/// 存活检查，不访问任何依赖
pub async fn health_check() -> StatusCode {
    StatusCode::NO_CONTENT
}
