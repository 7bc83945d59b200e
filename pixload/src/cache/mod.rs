//! Caches used by the image manager.
//!
//! Three tiers, checked in order on every request:
//!
//! | Tier | Type | Contents | Key |
//! |------|------|----------|-----|
//! | 1 | [`MemoryCache`] | decoded bitmaps | [`CacheKey`](crate::request::CacheKey) |
//! | 2 | [`DataCache`] | raw fetched bytes | fetch key |
//! | 3 | [`DiskStore`] | raw fetched bytes on disk | fetch key |
//!
//! A hit in a lower tier skips the fetch but still decodes.

mod data;
mod disk;
mod memory;

pub use data::{DataCache, DataCacheStats};
pub use disk::{BoxFuture, DiskStore, DiskStoreError, FsDiskStore, GcResult};
pub use memory::{CacheEntry, MemoryCache, MemoryCacheStats};
