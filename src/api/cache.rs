// 缓存管理 API
//
// 提供预览缓存的 HTTP API 端点，包括：
// - 获取缓存统计
// - 清空全部缓存（内存 + 磁盘）
// - 只清空内存缓存

use axum::{
    extract::State,
    response::IntoResponse,
};

use super::error::ApiResult;
use super::response::{success, ApiResponse};
use super::AppState;

/// 获取缓存统计
///
/// # 端点
/// GET /api/cache/stats
pub async fn get_cache_stats(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.previews.cache().stats()))
}

/// 清空全部预览缓存
///
/// # 端点
/// POST /api/cache/clear
pub async fn clear_cache(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let cache = state.previews.cache();
    cache.clear_all().await;

    tracing::info!("预览缓存已清空");

    Ok(ApiResponse::success_with_message(cache.stats(), "缓存已清空"))
}

/// 只清空内存缓存（磁盘缓存保留）
///
/// # 端点
/// POST /api/cache/clear-memory
pub async fn clear_memory_cache(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let cache = state.previews.cache();
    cache.clear_memory_only();

    Ok(ApiResponse::success_with_message(cache.stats(), "内存缓存已清空"))
}
