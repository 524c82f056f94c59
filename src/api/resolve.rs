use axum::{
    extract::State,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::{ApiError, ApiResult};
use super::response::success;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub url: String,
}

/// 解析缩略图对应的原图地址
///
/// # 端点
/// POST /api/resolve
///
/// # 响应
/// ```json
/// { "success": true, "data": { "resolved_url": "...", "used_fallback": false } }
/// ```
pub async fn resolve_url(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<impl IntoResponse> {
    let url = req.url.trim();
    Url::parse(url).map_err(|e| ApiError::BadRequest(format!("无效的图片地址 {}: {}", url, e)))?;

    let result = state.resolver.resolve(url, &CancellationToken::new()).await;
    Ok(success(result))
}
