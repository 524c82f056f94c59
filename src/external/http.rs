// HTTP 客户端 - 字节下载与存在性探测
//
// 本模块提供：
// - 带超时和取消的字节下载（GET）
// - 轻量级存在性探测（HEAD），探测失败只返回 false，不返回错误

use crate::services::download::error::DownloadError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 默认 User-Agent（常见浏览器标识，减少防盗链拦截）
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 存在性探测能力
///
/// 2xx 视为存在；任何错误、非 2xx、超时、取消都视为不存在
#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    async fn exists(&self, url: &str, cancel: &CancellationToken) -> bool;
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpClientConfig {
    /// 单次请求的整体超时
    pub request_timeout: Duration,

    /// HEAD 探测超时（必须短于整体超时）
    pub head_probe_timeout: Duration,

    /// User-Agent
    pub user_agent: String,

    /// 每个主机保留的空闲连接数
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            head_probe_timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_max_idle_per_host: 10,
        }
    }
}

/// 进程级 HTTP 客户端（内部 reqwest::Client 自带连接池，clone 开销很小）
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// 创建 HTTP 客户端
    pub fn new(config: HttpClientConfig) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.head_probe_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DownloadError::ClientBuild(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// 下载完整内容（带超时，可取消）
    pub async fn fetch_bytes(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, DownloadError> {
        let request = async {
            let response = self.client.get(url).send().await?;

            // 检查 HTTP 状态码
            let status = response.status();
            if !status.is_success() {
                return Err(DownloadError::HttpError(status.as_u16()));
            }

            let bytes = response.bytes().await?;
            Ok::<Vec<u8>, DownloadError>(bytes.to_vec())
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = timeout(self.config.request_timeout, request) => {
                result.unwrap_or(Err(DownloadError::Timeout))
            }
        }
    }

    /// HEAD 探测：自身短超时与调用方的取消信号联动，先触发者生效
    pub async fn head_exists(&self, url: &str, cancel: &CancellationToken) -> bool {
        let probe = self
            .client
            .head(url)
            .timeout(self.config.head_probe_timeout)
            .send();

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("HEAD 探测被取消: {}", url);
                false
            }
            result = timeout(self.config.head_probe_timeout, probe) => match result {
                Ok(Ok(response)) => {
                    let exists = response.status().is_success();
                    debug!("HEAD 探测 {} -> {}", url, response.status());
                    exists
                }
                Ok(Err(e)) => {
                    debug!("HEAD 探测失败: {}: {}", url, e);
                    false
                }
                Err(_) => {
                    debug!("HEAD 探测超时: {}", url);
                    false
                }
            }
        }
    }
}

#[async_trait]
impl ExistenceProbe for HttpClient {
    async fn exists(&self, url: &str, cancel: &CancellationToken) -> bool {
        self.head_exists(url, cancel).await
    }
}
