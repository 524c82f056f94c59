// 运行配置 - 从环境变量加载的全局配置
//
// 本模块提供：
// - HarvestConfig：所有可调参数及默认值
// - from_env()：读取环境变量（main 中先执行 dotenv）
// - validate()：拒绝无法工作的组合
// - 派生各子系统的配置

use crate::external::{HttpClientConfig, DEFAULT_USER_AGENT};
use crate::models::ScanMode;
use crate::services::cache::{BitmapCodec, PreviewCacheConfig};
use crate::services::download::DownloadConfig;
use crate::services::scan::ScanConfig;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("环境变量 {name} 的值无效: {value} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 全局配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarvestConfig {
    /// 扫描模式 (SCAN_MODE: fast | thorough)
    pub scan_mode: ScanMode,
    /// 稳定性检查间隔 (STABILITY_CHECK_INTERVAL_MS)
    pub stability_check_interval_ms: u64,
    /// 收敛所需的连续稳定次数 (STABILITY_THRESHOLD)
    pub stability_threshold: usize,
    /// 快速模式滚动间隔 (SCROLL_DELAY_MS)
    pub scroll_delay_ms: u64,
    /// 快速模式初始等待 (FAST_SETTLE_DELAY_MS)
    pub fast_settle_delay_ms: u64,
    /// 导航尝试次数 (NAVIGATION_RETRIES)
    pub navigation_retries: u32,
    /// 导航重试间隔 (NAVIGATION_RETRY_DELAY_MS)
    pub navigation_retry_delay_ms: u64,
    /// 页面加载超时 (PAGE_LOAD_TIMEOUT_SECS)
    pub page_load_timeout_secs: u64,
    /// 隐式等待 (IMPLICIT_WAIT_SECS)
    pub implicit_wait_secs: u64,
    /// 彻底模式迭代上限 (MAX_SCAN_ITERATIONS)
    pub max_scan_iterations: usize,
    /// HEAD 探测超时 (HEAD_PROBE_TIMEOUT_SECS)
    pub head_probe_timeout_secs: u64,
    /// 请求超时 (REQUEST_TIMEOUT_SECS)
    pub request_timeout_secs: u64,
    /// 内存预览缓存容量 (MEMORY_CACHE_CAPACITY)
    pub memory_cache_capacity: usize,
    /// 是否启用磁盘预览缓存 (DISK_CACHE_ENABLED)
    pub disk_cache_enabled: bool,
    /// 磁盘预览缓存目录 (DISK_CACHE_DIR)
    pub disk_cache_dir: PathBuf,
    /// 默认预览宽度 (PREVIEW_WIDTH)
    pub preview_width: u32,
    /// 请求可指定的最大预览宽度 (MAX_PREVIEW_WIDTH)
    pub max_preview_width: u32,
    /// 最大并发下载数 (MAX_CONCURRENT_DOWNLOADS)
    pub max_concurrent_downloads: usize,
    /// 最小文件大小，字节 (MIN_FILE_SIZE)
    pub min_file_size: u64,
    /// 默认下载目录 (DOWNLOAD_DIR)
    pub download_dir: PathBuf,
    /// User-Agent (USER_AGENT)
    pub user_agent: String,
    /// 监听地址 (HOST)
    pub host: String,
    /// 监听端口 (PORT)
    pub port: u16,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::Thorough,
            stability_check_interval_ms: 1500,
            stability_threshold: 3,
            scroll_delay_ms: 800,
            fast_settle_delay_ms: 3000,
            navigation_retries: 3,
            navigation_retry_delay_ms: 2000,
            page_load_timeout_secs: 30,
            implicit_wait_secs: 10,
            max_scan_iterations: 500,
            head_probe_timeout_secs: 5,
            request_timeout_secs: 30,
            memory_cache_capacity: 200,
            disk_cache_enabled: true,
            disk_cache_dir: PathBuf::from("cache/previews"),
            preview_width: 200,
            max_preview_width: 4096,
            max_concurrent_downloads: 5,
            min_file_size: 0,
            download_dir: PathBuf::from("downloads"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl HarvestConfig {
    /// 从进程环境变量加载（未设置的变量使用默认值）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意键值来源加载
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let env = EnvReader { lookup: &lookup };

        env.read("SCAN_MODE", &mut config.scan_mode)?;
        env.read("STABILITY_CHECK_INTERVAL_MS", &mut config.stability_check_interval_ms)?;
        env.read("STABILITY_THRESHOLD", &mut config.stability_threshold)?;
        env.read("SCROLL_DELAY_MS", &mut config.scroll_delay_ms)?;
        env.read("FAST_SETTLE_DELAY_MS", &mut config.fast_settle_delay_ms)?;
        env.read("NAVIGATION_RETRIES", &mut config.navigation_retries)?;
        env.read("NAVIGATION_RETRY_DELAY_MS", &mut config.navigation_retry_delay_ms)?;
        env.read("PAGE_LOAD_TIMEOUT_SECS", &mut config.page_load_timeout_secs)?;
        env.read("IMPLICIT_WAIT_SECS", &mut config.implicit_wait_secs)?;
        env.read("MAX_SCAN_ITERATIONS", &mut config.max_scan_iterations)?;
        env.read("HEAD_PROBE_TIMEOUT_SECS", &mut config.head_probe_timeout_secs)?;
        env.read("REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        env.read("MEMORY_CACHE_CAPACITY", &mut config.memory_cache_capacity)?;
        env.read("DISK_CACHE_ENABLED", &mut config.disk_cache_enabled)?;
        env.read("DISK_CACHE_DIR", &mut config.disk_cache_dir)?;
        env.read("PREVIEW_WIDTH", &mut config.preview_width)?;
        env.read("MAX_PREVIEW_WIDTH", &mut config.max_preview_width)?;
        env.read("MAX_CONCURRENT_DOWNLOADS", &mut config.max_concurrent_downloads)?;
        env.read("MIN_FILE_SIZE", &mut config.min_file_size)?;
        env.read("DOWNLOAD_DIR", &mut config.download_dir)?;
        env.read("USER_AGENT", &mut config.user_agent)?;
        env.read("HOST", &mut config.host)?;
        env.read("PORT", &mut config.port)?;

        Ok(config)
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_cache_capacity == 0 {
            return Err(ConfigError::Invalid("内存缓存容量必须大于 0".to_string()));
        }
        if self.stability_threshold == 0 {
            return Err(ConfigError::Invalid("稳定阈值必须大于 0".to_string()));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::Invalid("并发下载数必须大于 0".to_string()));
        }
        if self.navigation_retries == 0 {
            return Err(ConfigError::Invalid("导航尝试次数必须大于 0".to_string()));
        }
        if self.preview_width == 0 {
            return Err(ConfigError::Invalid("预览宽度必须大于 0".to_string()));
        }
        if self.max_preview_width > BitmapCodec::MAX_DECODE_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "最大预览宽度不能超过 {}",
                BitmapCodec::MAX_DECODE_WIDTH
            )));
        }
        if self.preview_width > self.max_preview_width {
            return Err(ConfigError::Invalid(format!(
                "预览宽度 ({}) 不能超过最大预览宽度 ({})",
                self.preview_width, self.max_preview_width
            )));
        }
        if self.head_probe_timeout_secs >= self.request_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "HEAD 探测超时 ({}s) 必须短于请求超时 ({}s)",
                self.head_probe_timeout_secs, self.request_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            mode: self.scan_mode,
            stability_check_interval: Duration::from_millis(self.stability_check_interval_ms),
            stability_threshold: self.stability_threshold,
            scroll_delay: Duration::from_millis(self.scroll_delay_ms),
            fast_settle_delay: Duration::from_millis(self.fast_settle_delay_ms),
            navigation_retries: self.navigation_retries,
            navigation_retry_delay: Duration::from_millis(self.navigation_retry_delay_ms),
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
            implicit_wait: Duration::from_secs(self.implicit_wait_secs),
            max_scan_iterations: self.max_scan_iterations,
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            head_probe_timeout: Duration::from_secs(self.head_probe_timeout_secs),
            user_agent: self.user_agent.clone(),
            ..HttpClientConfig::default()
        }
    }

    pub fn preview_cache_config(&self) -> PreviewCacheConfig {
        PreviewCacheConfig {
            memory_capacity: self.memory_cache_capacity,
            disk_enabled: self.disk_cache_enabled,
            disk_dir: self.disk_cache_dir.clone(),
        }
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            max_concurrent: self.max_concurrent_downloads,
            min_file_size: self.min_file_size,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<'a, F: Fn(&str) -> Option<String>> EnvReader<'a, F> {
    /// 变量存在且非空时解析并覆盖默认值
    fn read<T>(&self, name: &'static str, target: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = (self.lookup)(name) else {
            return Ok(());
        };
        let value = raw.trim();
        if value.is_empty() {
            return Ok(());
        }

        *target = value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HarvestConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, HarvestConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.scan_config().max_scan_iterations, 500);
    }

    #[test]
    fn test_env_overrides() {
        let config = HarvestConfig::from_lookup(lookup(&[
            ("SCAN_MODE", "fast"),
            ("STABILITY_THRESHOLD", "5"),
            ("DISK_CACHE_ENABLED", "false"),
            ("DISK_CACHE_DIR", "/tmp/previews"),
            ("PORT", "8080"),
            ("MIN_FILE_SIZE", " "),
        ]))
        .unwrap();

        assert_eq!(config.scan_mode, ScanMode::Fast);
        assert_eq!(config.stability_threshold, 5);
        assert!(!config.disk_cache_enabled);
        assert_eq!(config.disk_cache_dir, PathBuf::from("/tmp/previews"));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.min_file_size, 0);
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = HarvestConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        let zero_capacity = HarvestConfig {
            memory_cache_capacity: 0,
            ..HarvestConfig::default()
        };
        assert!(zero_capacity.validate().is_err());

        let zero_threshold = HarvestConfig {
            stability_threshold: 0,
            ..HarvestConfig::default()
        };
        assert!(zero_threshold.validate().is_err());

        let zero_concurrency = HarvestConfig {
            max_concurrent_downloads: 0,
            ..HarvestConfig::default()
        };
        assert!(zero_concurrency.validate().is_err());

        let slow_probe = HarvestConfig {
            head_probe_timeout_secs: 30,
            request_timeout_secs: 30,
            ..HarvestConfig::default()
        };
        assert!(slow_probe.validate().is_err());

        let wide_default = HarvestConfig {
            preview_width: 5000,
            ..HarvestConfig::default()
        };
        assert!(wide_default.validate().is_err());

        let cap_over_codec = HarvestConfig {
            max_preview_width: BitmapCodec::MAX_DECODE_WIDTH + 1,
            ..HarvestConfig::default()
        };
        assert!(cap_over_codec.validate().is_err());
    }

    #[test]
    fn test_derived_configs() {
        let config = HarvestConfig::default();
        let http = config.http_config();
        assert!(http.head_probe_timeout < http.request_timeout);
        assert_eq!(config.preview_cache_config().memory_capacity, 200);
        assert_eq!(config.download_config().max_concurrent, 5);
    }
}
