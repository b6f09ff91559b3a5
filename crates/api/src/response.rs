use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// 列表响应，`total` 为满足过滤条件的总数，与分页无关
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>, total: i64) -> Self {
        Self { data, total }
    }
}

impl<T> IntoResponse for ListResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}
