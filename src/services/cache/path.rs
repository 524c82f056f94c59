// 缓存键与磁盘路径
//
// 提供统一的缓存键生成和磁盘文件命名规则

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// 预览缓存键：`url + "_" + width`
///
/// 同一个 URL 的不同解码宽度是不同的条目（像素数据不同）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(url: &str, decode_width: u32) -> Self {
        Self(format!("{}_{}", url, decode_width))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 键的 SHA-256 十六进制摘要（固定 64 个字符）
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 缓存路径生成器
pub struct CachePath;

impl CachePath {
    /// 磁盘缓存文件扩展名
    const EXTENSION: &'static str = "cache";

    /// 写入中的临时文件扩展名
    const PARTIAL_EXTENSION: &'static str = "partial";

    /// 生成磁盘缓存文件路径：`{cache_dir}/{sha256(key)}.cache`
    ///
    /// # 示例
    /// ```
    /// use image_harvester::services::cache::{CacheKey, CachePath};
    /// use std::path::Path;
    ///
    /// let key = CacheKey::new("https://example.com/a.jpg", 200);
    /// let path = CachePath::entry_path(Path::new("cache"), &key);
    /// assert!(path.to_string_lossy().ends_with(".cache"));
    /// ```
    pub fn entry_path(cache_dir: &Path, key: &CacheKey) -> PathBuf {
        cache_dir.join(format!("{}.{}", key.digest(), Self::EXTENSION))
    }

    /// 写入时使用的临时路径，写完后原子重命名为正式路径
    pub fn partial_path(cache_dir: &Path, key: &CacheKey) -> PathBuf {
        cache_dir.join(format!(
            "{}.{}.{}",
            key.digest(),
            Self::EXTENSION,
            Self::PARTIAL_EXTENSION
        ))
    }

    /// 是否为正式的缓存文件
    pub fn is_entry_file(path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(Self::EXTENSION)
    }
}
