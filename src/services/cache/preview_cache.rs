// 预览缓存 - 内存 + 磁盘两级缓存
//
// 本模块按 (URL, 解码宽度) 缓存解码后的预览位图：
// - 内存层：固定容量 LRU（ResourceCache）
// - 磁盘层：以缓存键 SHA-256 命名的 WebP 文件，损坏即删除
// - 未命中时调用外部 loader，成功结果后台写入磁盘（不阻塞调用方）

use crate::services::cache::bitmap_codec::{Bitmap, BitmapCodec};
use crate::services::cache::error::{CacheError, ConversionError, FileSystemError};
use crate::services::cache::path::{CacheKey, CachePath};
use crate::services::cache::resource_cache::ResourceCache;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 预览缓存配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewCacheConfig {
    /// 内存层容量（条目数）
    pub memory_capacity: usize,

    /// 是否启用磁盘层
    pub disk_enabled: bool,

    /// 磁盘层目录
    pub disk_dir: PathBuf,
}

impl Default for PreviewCacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 200,
            disk_enabled: true,
            disk_dir: PathBuf::from("cache").join("previews"),
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewCacheStats {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub disk_enabled: bool,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub loader_calls: u64,
    pub corrupt_entries_removed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    loader_calls: AtomicU64,
    corrupt_entries_removed: AtomicU64,
}

/// 两级预览缓存
///
/// 同一个键的并发未命中不做合并：两个调用方可能都会执行 loader，
/// 需要严格"只加载一次"的调用方应自行加锁
pub struct PreviewCache {
    /// 内存层（ResourceCache 本身不加锁）
    memory: Mutex<ResourceCache<CacheKey, Bitmap>>,

    /// 磁盘层目录
    disk_dir: PathBuf,

    /// 磁盘层当前是否可用（目录创建失败后在进程生命周期内保持关闭）
    disk_available: AtomicBool,

    /// 后台磁盘写入任务
    pending_writes: TaskTracker,

    /// 串行化 close → wait → reopen
    drain_lock: AsyncMutex<()>,

    counters: Counters,
}

impl PreviewCache {
    /// 创建预览缓存
    ///
    /// 只有内存层容量为 0 时返回错误；磁盘目录无法创建时退化为纯内存缓存
    pub fn new(config: PreviewCacheConfig) -> Result<Self, CacheError> {
        let memory = ResourceCache::new(config.memory_capacity)?;

        let disk_available = config.disk_enabled && Self::prepare_disk_dir(&config.disk_dir);
        if config.disk_enabled && disk_available {
            info!("预览磁盘缓存目录: {}", config.disk_dir.display());
        }

        Ok(Self {
            memory: Mutex::new(memory),
            disk_dir: config.disk_dir,
            disk_available: AtomicBool::new(disk_available),
            pending_writes: TaskTracker::new(),
            drain_lock: AsyncMutex::new(()),
            counters: Counters::default(),
        })
    }

    fn prepare_disk_dir(dir: &Path) -> bool {
        match std::fs::create_dir_all(dir) {
            Ok(()) => true,
            Err(e) => {
                let err = FileSystemError::CreateDirFailed {
                    path: dir.to_path_buf(),
                    source: e,
                };
                warn!("磁盘缓存不可用，退化为纯内存缓存: {}", err);
                false
            }
        }
    }

    /// 按 (URL, 宽度) 获取预览位图，未命中时调用 loader
    ///
    /// # 查找顺序
    /// 1. 内存层命中直接返回（不做磁盘 I/O）
    /// 2. 磁盘层命中则解码、放入内存层后返回；解码失败删除文件并继续
    /// 3. 调用 loader，成功结果放入内存层，并在后台写入磁盘
    ///
    /// # 返回
    /// loader 返回 `None` 时返回 `None`（调用方可见的失败，但不是错误）
    pub async fn get_or_load<F, Fut>(&self, url: &str, decode_width: u32, loader: F) -> Option<Bitmap>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Bitmap>>,
    {
        let key = CacheKey::new(url, decode_width);

        let cached = self.memory().get(&key).cloned();
        if let Some(bitmap) = cached {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!("预览内存缓存命中: {}", key);
            return Some(bitmap);
        }

        if self.disk_enabled() {
            if let Some(bitmap) = self.read_disk_entry(&key, decode_width).await {
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!("预览磁盘缓存命中: {}", key);
                self.memory().put(key, bitmap.clone());
                return Some(bitmap);
            }
        }

        self.counters.loader_calls.fetch_add(1, Ordering::Relaxed);
        let bitmap = loader().await?;

        self.memory().put(key.clone(), bitmap.clone());
        if self.disk_enabled() {
            self.spawn_disk_write(key, bitmap.clone());
        }

        Some(bitmap)
    }

    /// 清空内存层，并删除重建磁盘目录
    pub async fn clear_all(&self) {
        self.memory().clear();

        // 磁盘层不可用时目录不归本缓存管理
        if !self.disk_enabled() {
            return;
        }

        // 先等后台写入结束，避免清空后又写回旧条目
        self.wait_for_pending_writes().await;

        match fs::remove_dir_all(&self.disk_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("删除磁盘缓存目录失败: {:?}: {}", self.disk_dir, e),
        }

        if let Err(e) = fs::create_dir_all(&self.disk_dir).await {
            warn!("重建磁盘缓存目录失败，磁盘缓存已关闭: {:?}: {}", self.disk_dir, e);
            self.disk_available.store(false, Ordering::Release);
        }

        info!("预览缓存已全部清空");
    }

    /// 只清空内存层，磁盘层保持不变
    pub fn clear_memory_only(&self) {
        self.memory().clear();
        debug!("预览内存缓存已清空");
    }

    /// 等待所有后台磁盘写入完成（关闭进程前调用）
    pub async fn wait_for_pending_writes(&self) {
        let _drain = self.drain_lock.lock().await;
        self.pending_writes.close();
        self.pending_writes.wait().await;
        self.pending_writes.reopen();
    }

    pub fn disk_enabled(&self) -> bool {
        self.disk_available.load(Ordering::Acquire)
    }

    pub fn disk_dir(&self) -> &Path {
        &self.disk_dir
    }

    pub fn stats(&self) -> PreviewCacheStats {
        let memory = self.memory();
        PreviewCacheStats {
            memory_entries: memory.count(),
            memory_capacity: memory.capacity(),
            disk_enabled: self.disk_enabled(),
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            loader_calls: self.counters.loader_calls.load(Ordering::Relaxed),
            corrupt_entries_removed: self.counters.corrupt_entries_removed.load(Ordering::Relaxed),
        }
    }

    fn memory(&self) -> MutexGuard<'_, ResourceCache<CacheKey, Bitmap>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 读取并解码磁盘条目，损坏的文件会被删除
    async fn read_disk_entry(&self, key: &CacheKey, decode_width: u32) -> Option<Bitmap> {
        let path = CachePath::entry_path(&self.disk_dir, key);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("读取磁盘缓存失败: {:?}: {}", path, e);
                return None;
            }
        };

        match task::spawn_blocking(move || BitmapCodec::decode_cached(&data, decode_width)).await {
            Ok(Ok(bitmap)) => Some(Arc::new(bitmap)),
            Ok(Err(e)) => {
                warn!("磁盘缓存文件损坏，已删除: {:?}: {}", path, e);
                self.counters.corrupt_entries_removed.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = fs::remove_file(&path).await {
                    debug!("删除损坏缓存文件失败: {:?}: {}", path, e);
                }
                None
            }
            Err(e) => {
                warn!("磁盘缓存解码任务失败: {}", e);
                None
            }
        }
    }

    /// 后台写入磁盘（fire-and-forget：失败只记录日志，不重试）
    fn spawn_disk_write(&self, key: CacheKey, bitmap: Bitmap) {
        let dir = self.disk_dir.clone();
        self.pending_writes.spawn(async move {
            if let Err(e) = Self::write_disk_entry(&dir, &key, bitmap).await {
                warn!("写入磁盘缓存失败: {}: {}", key, e);
            }
        });
    }

    async fn write_disk_entry(dir: &Path, key: &CacheKey, bitmap: Bitmap) -> Result<(), CacheError> {
        let encoded = task::spawn_blocking(move || BitmapCodec::encode_lossless(&bitmap))
            .await
            .map_err(|e| ConversionError::TaskFailed(e.to_string()))??;

        // 先写临时文件再重命名：正式文件存在即代表编码成功
        let partial = CachePath::partial_path(dir, key);
        let target = CachePath::entry_path(dir, key);

        fs::write(&partial, encoded).await.map_err(|source| FileSystemError::WriteFileFailed {
            path: partial.clone(),
            source,
        })?;

        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!("预览已写入磁盘缓存: {:?}", target);
        Ok(())
    }
}
