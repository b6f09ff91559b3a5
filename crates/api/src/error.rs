use std::any::Any;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use processor_core::{ErrorDetail, ProcessorError};
use serde_json::json;
use tracing::{error, warn};

/// 无法归类的错误使用的错误码
pub const DEFAULT_ERROR_CODE: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("{0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Processor(e) => StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        match self {
            ApiError::Processor(e) => e.to_detail(),
            ApiError::Unexpected(msg) => ErrorDetail {
                detail: msg.clone(),
                code: DEFAULT_ERROR_CODE,
                parameters: json!({}),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Processor(ProcessorError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Processor(ProcessorError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Processor(ProcessorError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();

        if status.is_server_error() {
            error!(code = detail.code, "Request failed: {}", detail.detail);
        } else {
            warn!(code = detail.code, "Request rejected: {}", detail.detail);
        }

        (status, Json(detail)).into_response()
    }
}

/// 处理器 panic 时返回的响应，与其他错误保持同样的结构
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown internal error".to_string()
    };
    ApiError::Unexpected(message).into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;
