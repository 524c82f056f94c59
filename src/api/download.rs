use axum::{
    extract::State,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::models::{DownloadOutcome, DownloadStatus};

use super::error::{ApiError, ApiResult};
use super::response::success;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub urls: Vec<String>,
    /// 下载目录下的子目录（相对路径），不提供时直接写入下载目录
    pub target_dir: Option<PathBuf>,
}

/// 批量下载结果
#[derive(Debug, Serialize)]
pub struct DownloadSummary {
    pub total: usize,
    pub downloaded: usize,
    pub backup: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub target_dir: String,
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadSummary {
    fn new(target_dir: String, outcomes: Vec<DownloadOutcome>) -> Self {
        let count = |pred: fn(&DownloadStatus) -> bool| outcomes.iter().filter(|o| pred(&o.status)).count();

        Self {
            total: outcomes.len(),
            downloaded: count(|s| matches!(s, DownloadStatus::Downloaded)),
            backup: count(|s| matches!(s, DownloadStatus::Backup)),
            skipped: count(|s| matches!(s, DownloadStatus::Skipped(_))),
            failed: count(|s| matches!(s, DownloadStatus::Failed(_))),
            cancelled: count(|s| matches!(s, DownloadStatus::Cancelled)),
            target_dir,
            outcomes,
        }
    }
}

/// 批量下载图片
///
/// # 端点
/// POST /api/download
pub async fn download_images(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.urls.iter().any(|url| url.trim().is_empty()) {
        return Err(ApiError::Validation("下载列表中包含空地址".to_string()));
    }

    let target_dir = match req.target_dir {
        Some(sub_dir) => state.config.download_dir.join(checked_sub_dir(&sub_dir)?),
        None => state.config.download_dir.clone(),
    };

    let outcomes = state
        .downloader
        .download_batch(req.urls, &target_dir, &CancellationToken::new())
        .await;

    Ok(success(DownloadSummary::new(target_dir.display().to_string(), outcomes)))
}

/// 校验子目录只由普通路径段组成，不能跳出下载目录
fn checked_sub_dir(sub_dir: &Path) -> ApiResult<&Path> {
    let contained = sub_dir
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

    if contained {
        Ok(sub_dir)
    } else {
        Err(ApiError::BadRequest(format!(
            "下载目录必须是下载根目录下的相对路径: {}",
            sub_dir.display()
        )))
    }
}
