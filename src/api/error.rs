use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::services::cache::CacheError;

/// 统一的API错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 未找到资源
    NotFound(String),
    /// 验证错误
    Validation(String),
    /// 冲突错误（如重复操作）
    Conflict(String),
    /// 内部服务器错误
    Internal(String),
    /// 外部服务错误（远程图片、浏览器）
    ExternalService(String),
    /// 请求参数错误
    BadRequest(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ExternalService(msg) => write!(f, "External service error: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// 从CacheError转换
impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Conversion(e) => ApiError::ExternalService(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// 实现IntoResponse，将错误转换为HTTP响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Validation(ref msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone())
            }
            ApiError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal server error occurred".to_string(),
                )
            }
            ApiError::ExternalService(ref msg) => {
                tracing::warn!("External service error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    msg.clone(),
                )
            }
            ApiError::BadRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", msg.clone())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result类型别名
pub type ApiResult<T> = Result<T, ApiError>;
