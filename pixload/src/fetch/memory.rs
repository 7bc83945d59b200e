//! In-memory fetcher serving registered bytes.

use super::{failed_stream, ByteStream, FetchError, Fetcher};
use crate::executor::Priority;
use crate::request::{fetch_key, Resource};
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Serves bytes registered ahead of time, keyed by canonical resource.
///
/// Useful for bundled images and for tests. Clones share the same table and
/// counters.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    entries: Arc<RwLock<HashMap<String, Bytes>>>,
    fetches: Arc<AtomicU64>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers bytes for a resource, replacing any previous value.
    pub fn insert(&self, resource: &Resource, data: impl Into<Bytes>) {
        self.entries.write().insert(fetch_key(resource), data.into());
    }

    /// Removes a registered resource.
    pub fn remove(&self, resource: &Resource) -> bool {
        self.entries.write().remove(&fetch_key(resource)).is_some()
    }

    /// Number of fetches started.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Fetcher for MemoryFetcher {
    fn name(&self) -> &str {
        "memory"
    }

    fn can_handle(&self, resource: &Resource) -> bool {
        self.entries.read().contains_key(&fetch_key(resource))
    }

    fn fetch(&self, resource: &Resource, _priority: Priority) -> ByteStream {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        match self.entries.read().get(&fetch_key(resource)) {
            Some(data) => stream::iter([Ok(data.clone())]).boxed(),
            None => failed_stream(FetchError::NotFound(resource.to_string())),
        }
    }
}
