// HTTP 接口 - 把扫描、解析、下载和预览能力暴露给任意前端

pub mod cache;
pub mod download;
pub mod error;
pub mod health;
pub mod preview;
pub mod resolve;
pub mod response;
pub mod scan;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::external::HttpClient;
use crate::services::cache::{CacheError, PreviewCache, PreviewService};
use crate::services::scan::BrowserLauncher;
use crate::services::{HarvestConfig, ImageDownloader, ScanOrchestrator, UrlResolver};
use scan::ScanRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HarvestConfig>,
    pub scanner: ScanOrchestrator,
    pub resolver: UrlResolver,
    pub downloader: ImageDownloader,
    pub previews: PreviewService,
    pub scans: ScanRegistry,
}

impl AppState {
    /// 组装各组件（HTTP 客户端由调用方创建一次后传入）
    pub fn new(
        config: HarvestConfig,
        http: HttpClient,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self, CacheError> {
        let resolver = UrlResolver::new(Arc::new(http.clone()));
        let downloader = ImageDownloader::new(http.clone(), resolver.clone(), config.download_config());
        let preview_cache = Arc::new(PreviewCache::new(config.preview_cache_config())?);
        let previews = PreviewService::new(http, preview_cache, config.max_concurrent_downloads);
        let scanner = ScanOrchestrator::new(launcher, config.scan_config());

        Ok(Self {
            config: Arc::new(config),
            scanner,
            resolver,
            downloader,
            previews,
            scans: ScanRegistry::new(),
        })
    }
}

/// 构建全部路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Image Harvester API v1.0" }))
        .route("/api/health", get(health::health_check))
        // Scan
        .route("/api/scan/start", post(scan::start_scan))
        .route("/api/scan/progress/:session_id", get(scan::get_scan_progress))
        .route("/api/scan/cancel/:session_id", post(scan::cancel_scan))
        // Resolve & download
        .route("/api/resolve", post(resolve::resolve_url))
        .route("/api/download", post(download::download_images))
        // Preview
        .route("/api/preview", get(preview::get_preview))
        .route("/api/preview/reload", post(preview::reload_previews))
        // Cache management
        .route("/api/cache/stats", get(cache::get_cache_stats))
        .route("/api/cache/clear", post(cache::clear_cache))
        .route("/api/cache/clear-memory", post(cache::clear_memory_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
