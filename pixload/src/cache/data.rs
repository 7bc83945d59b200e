//! In-memory cache of raw fetched bytes using moka.
//!
//! Keyed by fetch key, so every target size and content mode of one resource
//! shares a single download. moka is internally synchronized and async-safe,
//! so this cache lives outside the manager lock.

use bytes::Bytes;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time statistics of a [`DataCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

/// Byte-weighted cache of raw image data.
pub struct DataCache {
    cache: Cache<String, Bytes>,
    max_size_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DataCache {
    /// Creates a cache holding at most `max_size_bytes` of data.
    pub fn new(max_size_bytes: u64) -> Self {
        Self::build(max_size_bytes, None)
    }

    /// Creates a cache whose entries expire `ttl` after insertion.
    pub fn with_ttl(max_size_bytes: u64, ttl: Duration) -> Self {
        Self::build(max_size_bytes, Some(ttl))
    }

    fn build(max_size_bytes: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            // moka weights are u32; clamp very large entries
            .weigher(|_key: &String, value: &Bytes| -> u32 { value.len().min(u32::MAX as usize) as u32 })
            .max_capacity(max_size_bytes);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
            max_size_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached bytes for `key`.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        match self.cache.get(key).await {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores bytes for `key`. Eviction happens automatically.
    pub async fn put(&self, key: String, data: Bytes) {
        self.cache.insert(key, data).await;
        self.cache.run_pending_tasks().await;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn stats(&self) -> DataCacheStats {
        DataCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entry_count(),
            size_bytes: self.size_bytes(),
            max_size_bytes: self.max_size_bytes,
        }
    }
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("entries", &self.entry_count())
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = DataCache::new(1_000_000);
        cache.put("asset:a.png".to_string(), Bytes::from_static(b"abc")).await;

        assert_eq!(cache.get("asset:a.png").await, Some(Bytes::from_static(b"abc")));
        assert!(cache.contains("asset:a.png"));
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_miss() {
        let cache = DataCache::new(1_000_000);
        assert_eq!(cache.get("asset:missing.png").await, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_size_tracking() {
        let cache = DataCache::new(1_000_000);
        cache.put("a".to_string(), Bytes::from(vec![0u8; 1000])).await;
        cache.put("b".to_string(), Bytes::from(vec![0u8; 2000])).await;

        assert!(cache.size_bytes() >= 3000, "got {}", cache.size_bytes());
        assert_eq!(cache.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_eviction_respects_budget() {
        let cache = DataCache::new(2500);
        for key in ["a", "b", "c", "d"] {
            cache.put(key.to_string(), Bytes::from(vec![0u8; 1000])).await;
        }

        assert!(cache.size_bytes() <= 2500, "got {}", cache.size_bytes());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = DataCache::new(1_000_000);
        cache.put("a".to_string(), Bytes::from_static(b"x")).await;
        cache.clear().await;

        assert_eq!(cache.entry_count(), 0);
        assert!(!cache.contains("a"));
    }
}
