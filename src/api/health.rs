use axum::{
    extract::State,
    response::IntoResponse,
};
use serde_json::json;

use super::error::ApiResult;
use super::response::success;
use super::AppState;

/// 健康检查端点
pub async fn health_check(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let preview_cache = state.previews.cache();

    Ok(success(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "scan_mode": state.config.scan_mode,
        "disk_cache": if preview_cache.disk_enabled() { "enabled" } else { "disabled" },
        "active_scans": state.scans.active_count().await,
    })))
}
