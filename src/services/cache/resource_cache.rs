// 资源缓存 - 固定容量的 LRU 键值存储
//
// 纯内存数据结构，不做任何 I/O，也不做内部同步（调用方负责加锁）

use crate::services::cache::error::CacheError;
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// 固定容量的 LRU 缓存
///
/// - `get` / `put` 都会把条目提升为最近使用
/// - 容量满时插入新键，先淘汰最久未使用的条目
/// - 没有过期时间，淘汰完全由容量驱动
#[derive(Debug)]
pub struct ResourceCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq, V> ResourceCache<K, V> {
    /// 创建缓存，容量为 0 时失败
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::InvalidCapacity)?;
        Ok(Self {
            entries: LruCache::new(capacity),
        })
    }

    /// 读取并提升为最近使用
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// 写入条目
    ///
    /// 返回因容量被淘汰的条目（替换已有键不算淘汰）
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        match self.entries.push(key, value) {
            // push 在替换已有键时会把旧值连同同一个键返回，这里只关心真正的淘汰
            Some((evicted_key, evicted_value)) if !self.entries.contains(&evicted_key) => {
                Some((evicted_key, evicted_value))
            }
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.entries.pop(key).is_some()
    }

    /// 是否存在（不改变淘汰顺序）
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// 从最近使用到最久未使用的键，主要用于诊断和测试
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }
}
