// 扫描 API
//
// 扫描在阻塞线程中运行；进度事件经 channel 转发到进度存储，
// 前端通过会话 ID 轮询进度或请求取消

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::models::{ScanEvent, ScanMode, ScanState};
use crate::services::scan::{ScanError, ScanReport};

use super::error::{ApiError, ApiResult};
use super::response::{success, success_message};
use super::AppState;

/// 空闲多久后丢弃扫描记录
const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// 最多保留的扫描记录数
const MAX_SESSIONS: u64 = 256;

/// 扫描进度（轮询返回）
#[derive(Debug, Clone, Serialize)]
pub struct ScanProgress {
    pub session_id: String,
    pub url: String,
    pub mode: ScanMode,
    pub state: ScanState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub iteration: usize,
    pub image_count: usize,
    pub stable_iterations: usize,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanProgress {
    fn new(session_id: String, url: String, mode: ScanMode) -> Self {
        Self {
            session_id,
            url,
            mode,
            state: ScanState::Initializing,
            message: None,
            iteration: 0,
            image_count: 0,
            stable_iterations: 0,
            images: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn apply(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::State { state } => self.state = state,
            ScanEvent::Status { message } => self.message = Some(message),
            ScanEvent::Check {
                iteration,
                image_count,
                stable_iterations,
            } => {
                self.iteration = iteration;
                self.image_count = image_count;
                self.stable_iterations = stable_iterations;
            }
            ScanEvent::Finished { image_count } => self.image_count = image_count,
        }
    }

    fn finish(&mut self, result: Result<Result<ScanReport, ScanError>, String>) {
        self.finished_at = Some(Utc::now());
        match result {
            Ok(Ok(report)) => {
                self.state = ScanState::Done;
                self.iteration = report.iterations;
                self.image_count = report.images.len();
                self.images = report.images;
            }
            Ok(Err(ScanError::Cancelled)) => self.state = ScanState::Cancelled,
            Ok(Err(e)) => {
                self.state = ScanState::Failed;
                self.error = Some(e.to_string());
            }
            Err(e) => {
                self.state = ScanState::Failed;
                self.error = Some(e);
            }
        }
    }
}

/// 一个扫描会话在进度存储中的记录
pub struct ScanEntry {
    progress: RwLock<ScanProgress>,
    cancel: CancellationToken,
}

/// 扫描进度存储（空闲过期）
#[derive(Clone)]
pub struct ScanRegistry {
    sessions: Cache<String, Arc<ScanEntry>>,
}

impl Default for ScanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(MAX_SESSIONS)
                .time_to_idle(SESSION_IDLE_TTL)
                .build(),
        }
    }

    async fn insert(&self, entry: Arc<ScanEntry>) -> String {
        let session_id = entry.progress.read().await.session_id.clone();
        self.sessions.insert(session_id.clone(), entry).await;
        session_id
    }

    async fn get(&self, session_id: &str) -> Option<Arc<ScanEntry>> {
        self.sessions.get(session_id).await
    }

    /// 正在运行的扫描数量
    pub async fn active_count(&self) -> usize {
        let entries: Vec<Arc<ScanEntry>> = self.sessions.iter().map(|(_, entry)| entry).collect();

        let mut count = 0;
        for entry in entries {
            if !entry.progress.read().await.state.is_terminal() {
                count += 1;
            }
        }
        count
    }
}

/// 开始扫描请求体
#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub url: String,
    /// 不提供时使用配置中的模式
    pub mode: Option<ScanMode>,
}

#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub session_id: String,
    pub mode: ScanMode,
}

/// 开始扫描
///
/// # 端点
/// POST /api/scan/start
pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<StartScanRequest>,
) -> ApiResult<impl IntoResponse> {
    let url = req.url.trim().to_string();
    match Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(ApiError::BadRequest(format!("无效的页面地址: {}", url))),
    }

    let mode = req.mode.unwrap_or(state.config.scan_mode);
    let orchestrator = state.scanner.with_mode(mode);
    let cancel = CancellationToken::new();

    let entry = Arc::new(ScanEntry {
        progress: RwLock::new(ScanProgress::new(Uuid::new_v4().to_string(), url.clone(), mode)),
        cancel: cancel.clone(),
    });
    let session_id = state.scans.insert(entry.clone()).await;

    tracing::info!("开始扫描 {} ({}), 会话 {}", url, mode, session_id);

    let (tx, mut rx) = mpsc::unbounded_channel::<ScanEvent>();
    let forward_entry = entry.clone();
    let forwarder = async move {
        while let Some(event) = rx.recv().await {
            forward_entry.progress.write().await.apply(event);
        }
    };
    let scan = tokio::task::spawn_blocking(move || orchestrator.run(&url, &cancel, Some(tx)));

    tokio::spawn(async move {
        let (result, ()) = tokio::join!(scan, forwarder);
        let result = result.map_err(|e| format!("扫描任务执行失败: {}", e));
        entry.progress.write().await.finish(result);
    });

    Ok(success(StartScanResponse { session_id, mode }))
}

/// 查询扫描进度
///
/// # 端点
/// GET /api/scan/progress/:session_id
pub async fn get_scan_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .scans
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("扫描会话不存在: {}", session_id)))?;

    let progress = entry.progress.read().await.clone();
    Ok(success(progress))
}

/// 取消扫描
///
/// # 端点
/// POST /api/scan/cancel/:session_id
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .scans
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("扫描会话不存在: {}", session_id)))?;

    if entry.progress.read().await.state.is_terminal() {
        return Err(ApiError::Conflict(format!("扫描已结束: {}", session_id)));
    }

    entry.cancel.cancel();
    tracing::info!("已请求取消扫描: {}", session_id);

    Ok(success_message("取消请求已发送"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_applies_events() {
        let mut progress = ScanProgress::new("s".into(), "https://a.com".into(), ScanMode::Thorough);

        progress.apply(ScanEvent::State { state: ScanState::ThoroughLoop });
        progress.apply(ScanEvent::Check {
            iteration: 2,
            image_count: 7,
            stable_iterations: 1,
        });
        progress.apply(ScanEvent::Status { message: "scrolling".into() });

        assert_eq!(progress.state, ScanState::ThoroughLoop);
        assert_eq!(progress.iteration, 2);
        assert_eq!(progress.image_count, 7);
        assert_eq!(progress.message.as_deref(), Some("scrolling"));
    }

    #[test]
    fn test_progress_finish_failure() {
        let mut progress = ScanProgress::new("s".into(), "https://a.com".into(), ScanMode::Fast);
        progress.finish(Ok(Err(ScanError::NavigationTimeout { attempts: 3 })));

        assert_eq!(progress.state, ScanState::Failed);
        assert!(progress.error.unwrap().contains("3 attempts"));
        assert!(progress.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = ScanRegistry::new();
        let entry = Arc::new(ScanEntry {
            progress: RwLock::new(ScanProgress::new("abc".into(), "https://a.com".into(), ScanMode::Fast)),
            cancel: CancellationToken::new(),
        });

        let id = registry.insert(entry).await;
        assert_eq!(id, "abc");
        assert!(registry.get("abc").await.is_some());
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.active_count().await, 1);
    }
}
