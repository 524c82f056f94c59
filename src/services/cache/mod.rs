// 缓存模块 - 预览位图的两级缓存
//
// 本模块提供预览图的缓存功能，包括：
// - 通用 LRU 缓存（ResourceCache）
// - 内存 + 磁盘两级预览缓存（PreviewCache）
// - 位图解码、缩放与磁盘格式编解码
// - 缓存键与磁盘路径
// - 预览下载服务

pub mod bitmap_codec;
pub mod error;
pub mod path;
pub mod preview_cache;
pub mod preview_service;
pub mod resource_cache;

pub use bitmap_codec::{Bitmap, BitmapCodec};
pub use error::{CacheError, ConversionError, FileSystemError};
pub use path::{CacheKey, CachePath};
pub use preview_cache::{PreviewCache, PreviewCacheConfig, PreviewCacheStats};
pub use preview_service::{PreviewBatchReport, PreviewService};
pub use resource_cache::ResourceCache;
