// 下载结果

use serde::{Deserialize, Serialize};

/// 单个图片的下载状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum DownloadStatus {
    /// 原图（或已是最终地址）下载成功
    Downloaded,
    /// 原图未验证通过，保存的是缩略图
    Backup,
    /// 文件小于最小尺寸，未保存
    Skipped(String),
    /// 下载失败
    Failed(String),
    /// 用户取消
    Cancelled,
}

impl DownloadStatus {
    /// 是否落盘
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded | DownloadStatus::Backup)
    }
}

/// 单个图片的下载结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// 扫描得到的原始 URL
    pub source_url: String,
    /// 实际下载的 URL（解析后）
    pub resolved_url: Option<String>,
    /// 保存路径
    pub saved_path: Option<String>,
    /// 字节数
    pub bytes: Option<u64>,
    #[serde(flatten)]
    pub status: DownloadStatus,
}

impl DownloadOutcome {
    pub fn new(source_url: impl Into<String>, status: DownloadStatus) -> Self {
        Self {
            source_url: source_url.into(),
            resolved_url: None,
            saved_path: None,
            bytes: None,
            status,
        }
    }
}
