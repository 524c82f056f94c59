// 缓存模块错误类型定义
//
// 定义了预览缓存、位图编解码中可能出现的各种错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 缓存操作的统一错误类型
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("缓存容量必须大于 0")]
    InvalidCapacity,

    #[error("转换错误: {0}")]
    Conversion(#[from] ConversionError),

    #[error("文件系统错误: {0}")]
    FileSystem(#[from] FileSystemError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 位图编解码相关错误
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("图片数据损坏")]
    CorruptedData,

    #[error("无效的目标宽度: {0}")]
    InvalidWidth(u32),

    #[error("缩放后尺寸过大: {width}x{height}")]
    DimensionsTooLarge { width: u32, height: u64 },

    #[error("图片解码失败: {0}")]
    DecodeFailed(String),

    #[error("图片编码失败: {0}")]
    EncodeFailed(String),

    #[error("转换任务执行失败: {0}")]
    TaskFailed(String),
}

/// 文件系统相关错误
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("创建目录失败: {path:?}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("写入文件失败: {path:?}: {source}")]
    WriteFileFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<image::ImageError> for ConversionError {
    fn from(err: image::ImageError) -> Self {
        ConversionError::DecodeFailed(err.to_string())
    }
}
