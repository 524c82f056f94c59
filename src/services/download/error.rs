// 下载相关错误

use thiserror::Error;

/// 下载相关错误
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("下载超时")]
    Timeout,

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP 错误: 状态码 {0}")]
    HttpError(u16),

    #[error("下载已取消")]
    Cancelled,

    #[error("创建 HTTP 客户端失败: {0}")]
    ClientBuild(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

// 实现从 reqwest::Error 到 DownloadError 的转换
impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout
        } else if err.is_status() {
            if let Some(status) = err.status() {
                DownloadError::HttpError(status.as_u16())
            } else {
                DownloadError::NetworkError(err.to_string())
            }
        } else if err.is_builder() {
            DownloadError::InvalidUrl(err.to_string())
        } else {
            DownloadError::NetworkError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(DownloadError::HttpError(404).to_string(), "HTTP 错误: 状态码 404");
        assert_eq!(DownloadError::Cancelled.to_string(), "下载已取消");
    }
}
