// 预览服务 - 下载、解码并通过两级缓存提供预览位图
//
// 本模块把 HTTP 客户端、位图编解码器和预览缓存串起来：
// - 单张预览：缓存未命中时下载并解码到指定宽度
// - 批量重新加载：信号量限制并发，返回各状态数量

use crate::external::HttpClient;
use crate::services::cache::bitmap_codec::{Bitmap, BitmapCodec};
use crate::services::cache::preview_cache::PreviewCache;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 批量重新加载的结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewBatchReport {
    pub requested: usize,
    pub loaded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// 预览服务
#[derive(Clone)]
pub struct PreviewService {
    http: HttpClient,
    cache: Arc<PreviewCache>,
    semaphore: Arc<Semaphore>,
}

impl PreviewService {
    pub fn new(http: HttpClient, cache: Arc<PreviewCache>, max_concurrent: usize) -> Self {
        Self {
            http,
            cache,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn cache(&self) -> &Arc<PreviewCache> {
        &self.cache
    }

    /// 获取预览位图
    ///
    /// # 返回
    /// 下载或解码失败时返回 `None`（失败原因已记录日志）
    pub async fn preview(&self, url: &str, width: u32, cancel: &CancellationToken) -> Option<Bitmap> {
        self.cache
            .get_or_load(url, width, || self.load(url, width, cancel))
            .await
    }

    async fn load(&self, url: &str, width: u32, cancel: &CancellationToken) -> Option<Bitmap> {
        let bytes = match self.http.fetch_bytes(url, cancel).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("预览下载失败: {} - {}", url, e);
                return None;
            }
        };

        match BitmapCodec::decode_to_width_async(bytes, width).await {
            Ok(bitmap) => Some(Arc::new(bitmap)),
            Err(e) => {
                warn!("预览解码失败: {} - {}", url, e);
                None
            }
        }
    }

    /// 批量重新加载预览（例如切换预览宽度后）
    pub async fn reload_batch(
        &self,
        urls: Vec<String>,
        width: u32,
        cancel: &CancellationToken,
    ) -> PreviewBatchReport {
        let mut report = PreviewBatchReport {
            requested: urls.len(),
            ..PreviewBatchReport::default()
        };
        if urls.is_empty() {
            return report;
        }

        info!("批量加载预览，共 {} 张 (宽度 {})", urls.len(), width);

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let service = self.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    permit = service.semaphore.acquire() => permit.ok()?,
                };
                if cancel.is_cancelled() {
                    return None;
                }
                Some(service.preview(&url, width, &cancel).await.is_some())
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Some(true)) => report.loaded += 1,
                Ok(Some(false)) => report.failed += 1,
                Ok(None) => report.cancelled += 1,
                Err(e) => {
                    warn!("预览任务执行失败: {:?}", e);
                    report.failed += 1;
                }
            }
        }

        debug!("批量预览完成: {:?}", report);
        report
    }
}
