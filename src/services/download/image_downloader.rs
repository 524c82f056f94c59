// 图片下载器 - 批量下载扫描得到的图片
//
// 每张图片的处理流程：
// - 检查取消
// - 解析原图地址（UrlResolver）
// - 下载（整体超时，可取消）；原图下载失败时退回缩略图
// - 按最小文件大小过滤
// - 以 URL 末段生成文件名写入目标目录（冲突时追加哈希后缀）
//
// 并发由信号量限制，许可在任何退出路径上自动释放

use crate::external::HttpClient;
use crate::models::{DownloadOutcome, DownloadStatus, ResolutionResult};
use crate::services::download::error::DownloadError;
use crate::services::resolve::UrlResolver;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 文件名最大长度（不含扩展名）
const MAX_STEM_LEN: usize = 120;

/// 没有扩展名时使用的默认扩展名
const DEFAULT_EXTENSION: &str = "jpg";

/// 下载配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadConfig {
    /// 同时下载的最大数量
    pub max_concurrent: usize,
    /// 小于该字节数的文件不保存
    pub min_file_size: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_file_size: 0,
        }
    }
}

/// 图片下载器
#[derive(Clone)]
pub struct ImageDownloader {
    http: HttpClient,
    resolver: UrlResolver,
    config: DownloadConfig,
    semaphore: Arc<Semaphore>,
}

/// 一个批次内已占用的文件名（避免并发任务写同一个文件）
type ClaimedNames = Arc<Mutex<HashSet<PathBuf>>>;

impl ImageDownloader {
    pub fn new(http: HttpClient, resolver: UrlResolver, config: DownloadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            http,
            resolver,
            config,
            semaphore,
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// 批量下载
    ///
    /// # 参数
    /// - `urls`: 扫描得到的图片地址
    /// - `target_dir`: 保存目录（不存在时创建）
    /// - `cancel`: 取消信号
    ///
    /// # 返回
    /// 与输入顺序一致的下载结果
    pub async fn download_batch(
        &self,
        urls: Vec<String>,
        target_dir: &Path,
        cancel: &CancellationToken,
    ) -> Vec<DownloadOutcome> {
        if urls.is_empty() {
            return Vec::new();
        }

        info!("开始批量下载，共 {} 张图片 -> {:?}", urls.len(), target_dir);

        let claimed: ClaimedNames = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let downloader = self.clone();
            let target_dir = target_dir.to_path_buf();
            let cancel = cancel.clone();
            let claimed = claimed.clone();

            let handle = tokio::spawn(async move {
                downloader.download_one(&url, &target_dir, &cancel, &claimed).await
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => results.push(outcome),
                Err(e) => {
                    error!("下载任务执行失败: {:?}", e);
                    results.push(DownloadOutcome::new(
                        String::new(),
                        DownloadStatus::Failed(format!("任务执行失败: {}", e)),
                    ));
                }
            }
        }

        info!(
            "批量下载完成，保存: {}, 跳过: {}, 失败: {}, 取消: {}",
            results.iter().filter(|r| r.status.is_saved()).count(),
            results.iter().filter(|r| matches!(r.status, DownloadStatus::Skipped(_))).count(),
            results.iter().filter(|r| matches!(r.status, DownloadStatus::Failed(_))).count(),
            results.iter().filter(|r| r.status == DownloadStatus::Cancelled).count(),
        );

        results
    }

    async fn download_one(
        &self,
        url: &str,
        target_dir: &Path,
        cancel: &CancellationToken,
        claimed: &ClaimedNames,
    ) -> DownloadOutcome {
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return DownloadOutcome::new(url, DownloadStatus::Cancelled),
            permit = self.semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => return DownloadOutcome::new(url, DownloadStatus::Failed(e.to_string())),
            },
        };

        if cancel.is_cancelled() {
            return DownloadOutcome::new(url, DownloadStatus::Cancelled);
        }

        let resolution = self.resolver.resolve(url, cancel).await;
        if cancel.is_cancelled() {
            return DownloadOutcome::new(url, DownloadStatus::Cancelled);
        }

        let (bytes, fetched_url, is_backup) = match self.fetch(url, &resolution, cancel).await {
            Ok(fetched) => fetched,
            Err(DownloadError::Cancelled) => return DownloadOutcome::new(url, DownloadStatus::Cancelled),
            Err(e) => {
                warn!("下载失败: {} - {}", url, e);
                let mut outcome = DownloadOutcome::new(url, DownloadStatus::Failed(e.to_string()));
                outcome.resolved_url = Some(resolution.resolved_url);
                return outcome;
            }
        };

        let mut outcome = DownloadOutcome::new(url, DownloadStatus::Downloaded);
        outcome.resolved_url = Some(fetched_url.clone());
        outcome.bytes = Some(bytes.len() as u64);

        if (bytes.len() as u64) < self.config.min_file_size {
            debug!("文件过小，跳过: {} ({} bytes)", fetched_url, bytes.len());
            outcome.status = DownloadStatus::Skipped(format!(
                "{} bytes < {} bytes",
                bytes.len(),
                self.config.min_file_size
            ));
            return outcome;
        }

        match save_bytes(target_dir, &fetched_url, &bytes, claimed).await {
            Ok(path) => {
                info!("✓ 已保存: {} -> {:?}", fetched_url, path);
                outcome.saved_path = Some(path.display().to_string());
                if is_backup {
                    outcome.status = DownloadStatus::Backup;
                }
            }
            Err(e) => {
                error!("写入文件失败: {} - {}", fetched_url, e);
                outcome.status = DownloadStatus::Failed(e.to_string());
            }
        }

        outcome
    }

    /// 下载解析后的地址；原图失败时退回原始地址
    ///
    /// # 返回
    /// `(内容, 实际地址, 是否为备份缩略图)`
    async fn fetch(
        &self,
        url: &str,
        resolution: &ResolutionResult,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, String, bool), DownloadError> {
        match self.http.fetch_bytes(&resolution.resolved_url, cancel).await {
            Ok(bytes) => Ok((bytes, resolution.resolved_url.clone(), resolution.used_fallback)),
            Err(DownloadError::Cancelled) => Err(DownloadError::Cancelled),
            Err(e) if resolution.resolved_url != url => {
                warn!("原图下载失败，退回缩略图: {} - {}", resolution.resolved_url, e);
                let bytes = self.http.fetch_bytes(url, cancel).await?;
                Ok((bytes, url.to_string(), true))
            }
            Err(e) => Err(e),
        }
    }
}

/// 写入文件，返回保存路径
async fn save_bytes(
    target_dir: &Path,
    url: &str,
    bytes: &[u8],
    claimed: &ClaimedNames,
) -> Result<PathBuf, DownloadError> {
    fs::create_dir_all(target_dir).await?;

    let (stem, extension) = file_name_parts(url);
    let mut attempt = 0u32;
    let path = loop {
        let name = match attempt {
            0 => format!("{}.{}", stem, extension),
            1 => format!("{}_{}.{}", stem, short_hash(url), extension),
            n => format!("{}_{}_{}.{}", stem, short_hash(url), n, extension),
        };
        let candidate = target_dir.join(name);

        let is_free = {
            let mut names = claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            names.insert(candidate.clone())
        };
        if is_free && !fs::try_exists(&candidate).await.unwrap_or(false) {
            break candidate;
        }
        attempt += 1;
    };

    fs::write(&path, bytes).await?;
    Ok(path)
}

/// 从 URL 末段生成安全的文件名 `(stem, extension)`
pub fn file_name_parts(url: &str) -> (String, String) {
    let without_query = url.split(|c| c == '?' || c == '#').next().unwrap_or_default();
    // 去掉 scheme 和主机部分
    let path = match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or_default()
        }
        None => without_query,
    };
    let last_segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();

    let (raw_stem, raw_ext) = match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.len() <= 5 => (stem, ext),
        _ => (last_segment, DEFAULT_EXTENSION),
    };

    let mut stem = sanitize(raw_stem);
    if stem.is_empty() {
        stem = "image".to_string();
    }
    if stem.len() > MAX_STEM_LEN {
        stem = stem.chars().take(MAX_STEM_LEN).collect();
    }

    let extension = sanitize(raw_ext).to_ascii_lowercase();
    let extension = if extension.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        extension
    };

    (stem, extension)
}

/// 只保留字母数字与 `-_.`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

fn short_hash(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))[..8].to_string()
}
