// 预览 API
//
// 预览图经两级缓存获取，以 PNG 返回

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::services::cache::BitmapCodec;
use crate::services::HarvestConfig;

use super::error::{ApiError, ApiResult};
use super::response::success;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub url: String,
    /// 不提供时使用配置中的预览宽度
    pub width: Option<u32>,
}

/// 获取预览图
///
/// # 端点
/// GET /api/preview?url=...&width=200
pub async fn get_preview(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<impl IntoResponse> {
    let width = resolve_width(query.width, &state.config)?;

    let bitmap = state
        .previews
        .preview(&query.url, width, &CancellationToken::new())
        .await
        .ok_or_else(|| ApiError::ExternalService(format!("无法加载预览: {}", query.url)))?;

    let png = tokio::task::spawn_blocking(move || BitmapCodec::encode_png(&bitmap))
        .await
        .map_err(|e| ApiError::Internal(format!("PNG 编码任务失败: {}", e)))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

#[derive(Debug, Deserialize)]
pub struct ReloadRequest {
    pub urls: Vec<String>,
    pub width: Option<u32>,
}

/// 批量重新加载预览
///
/// # 端点
/// POST /api/preview/reload
pub async fn reload_previews(
    State(state): State<AppState>,
    Json(req): Json<ReloadRequest>,
) -> ApiResult<impl IntoResponse> {
    let width = resolve_width(req.width, &state.config)?;

    let report = state
        .previews
        .reload_batch(req.urls, width, &CancellationToken::new())
        .await;

    Ok(success(report))
}

fn resolve_width(requested: Option<u32>, config: &HarvestConfig) -> ApiResult<u32> {
    match requested.unwrap_or(config.preview_width) {
        0 => Err(ApiError::BadRequest("预览宽度必须大于 0".to_string())),
        width if width > config.max_preview_width => Err(ApiError::BadRequest(format!(
            "预览宽度不能超过 {}",
            config.max_preview_width
        ))),
        width => Ok(width),
    }
}
