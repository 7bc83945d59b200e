//! In-memory cache of decoded images with LRU eviction.
//!
//! Entries are weighted by their pixel buffer size and evicted least recently
//! used first once the byte budget is exceeded. Keys with a live in-flight
//! pipeline can be pinned; pinned entries are skipped by eviction.
//!
//! The cache is not internally synchronized. The manager keeps it behind the
//! same lock as its task registry so lookups and task creation are atomic.

use crate::decode::DecodedImage;
use crate::request::CacheKey;
use lru::LruCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// A cached decoded image.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub image: Arc<DecodedImage>,
    pub size_bytes: usize,
    pub last_access: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time statistics of a [`MemoryCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entry_count: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
}

impl MemoryCacheStats {
    /// Hit rate in `[0, 1]`, or 0 with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Byte-budgeted LRU cache of decoded images.
pub struct MemoryCache {
    entries: LruCache<CacheKey, CacheEntry>,
    pins: HashMap<CacheKey, usize>,
    size_bytes: usize,
    max_size_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl MemoryCache {
    /// Creates an empty cache holding at most `max_size_bytes` of pixels.
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            pins: HashMap::new(),
            size_bytes: 0,
            max_size_bytes,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    /// Looks up `key`, refreshing its recency.
    ///
    /// Expired entries are dropped and reported as a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Instant::now();
        let expired = match self.entries.peek(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.remove_entry(key);
            self.expirations += 1;
            self.misses += 1;
            trace!(key = %key, "Memory cache entry expired");
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_access = now;
        self.hits += 1;
        Some(entry.clone())
    }

    /// Returns true if a live entry exists, without touching recency or stats.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Inserts or replaces the entry for `key`, valid for `expiration_age`.
    ///
    /// Images larger than the whole budget are not stored. Returns the keys
    /// evicted to make room.
    pub fn put(&mut self, key: CacheKey, image: Arc<DecodedImage>, expiration_age: Duration) -> Vec<CacheKey> {
        let size_bytes = image.byte_size();
        if size_bytes > self.max_size_bytes {
            trace!(key = %key, size_bytes, "Image exceeds memory cache budget, not cached");
            self.remove_entry(&key);
            return Vec::new();
        }

        let now = Instant::now();
        let entry = CacheEntry {
            key: key.clone(),
            image,
            size_bytes,
            last_access: now,
            expires_at: now + expiration_age,
        };

        if let Some(previous) = self.entries.put(key, entry) {
            self.size_bytes -= previous.size_bytes;
        }
        self.size_bytes += size_bytes;

        self.evict_over_budget()
    }

    /// Removes the entry for `key`. Returns true if one existed.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Protects `key` from eviction. Pins are counted.
    pub fn pin(&mut self, key: &CacheKey) {
        *self.pins.entry(key.clone()).or_insert(0) += 1;
    }

    /// Releases one pin on `key` and evicts if the budget is exceeded.
    pub fn unpin(&mut self, key: &CacheKey) -> Vec<CacheKey> {
        if let Some(count) = self.pins.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(key);
            }
        }
        self.evict_over_budget()
    }

    pub fn is_pinned(&self, key: &CacheKey) -> bool {
        self.pins.contains_key(key)
    }

    /// Drops every entry. Pins are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }

    /// Changes the byte budget, evicting as needed.
    pub fn set_max_size(&mut self, max_size_bytes: usize) -> Vec<CacheKey> {
        self.max_size_bytes = max_size_bytes;
        self.evict_over_budget()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
            entry_count: self.entries.len(),
            size_bytes: self.size_bytes,
            max_size_bytes: self.max_size_bytes,
        }
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.size_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn evict_over_budget(&mut self) -> Vec<CacheKey> {
        if self.size_bytes <= self.max_size_bytes {
            return Vec::new();
        }

        // Least recently used first; pinned keys stay even if over budget
        let mut excess = self.size_bytes - self.max_size_bytes;
        let mut victims = Vec::new();
        for (key, entry) in self.entries.iter().rev() {
            if excess == 0 {
                break;
            }
            if self.pins.contains_key(key) {
                continue;
            }
            excess = excess.saturating_sub(entry.size_bytes);
            victims.push(key.clone());
        }

        for key in &victims {
            self.remove_entry(key);
            self.evictions += 1;
            trace!(key = %key, "Memory cache evicted");
        }
        victims
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.len())
            .field("size_bytes", &self.size_bytes)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("pinned", &self.pins.len())
            .finish()
    }
}
