//! Persistent store for raw image bytes.
//!
//! [`DiskStore`] is the pluggable byte store consulted after the memory data
//! cache. [`FsDiskStore`] keeps one file per fetch key, named by the SHA-256
//! of the key, and enforces a size budget by deleting the oldest-modified
//! files first.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from disk store operations.
#[derive(Debug, Error)]
pub enum DiskStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result of a garbage collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcResult {
    pub entries_removed: usize,
    pub bytes_freed: u64,
    pub duration_ms: u64,
}

impl fmt::Display for GcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GC: removed {} entries, freed {} bytes in {}ms",
            self.entries_removed, self.bytes_freed, self.duration_ms
        )
    }
}

/// Byte store keyed by fetch key.
///
/// Uses boxed futures so it can be held as `Arc<dyn DiskStore>`.
pub trait DiskStore: Send + Sync {
    /// Returns the stored bytes, or `None` if absent.
    fn read(&self, key: &str) -> BoxFuture<'_, Result<Option<Bytes>, DiskStoreError>>;

    /// Stores bytes, replacing any previous value.
    fn write(&self, key: &str, data: Bytes) -> BoxFuture<'_, Result<(), DiskStoreError>>;

    /// Removes every stored entry.
    fn clear(&self) -> BoxFuture<'_, Result<(), DiskStoreError>>;

    /// Approximate bytes currently stored.
    fn size_bytes(&self) -> u64;
}

/// File-per-key disk store with a size budget.
pub struct FsDiskStore {
    dir: PathBuf,
    max_size_bytes: u64,
    size_bytes: AtomicU64,
}

impl FsDiskStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// Existing files are counted toward the budget.
    pub async fn open(dir: impl Into<PathBuf>, max_size_bytes: u64) -> Result<Self, DiskStoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let existing: u64 = scan(&dir).await?.iter().map(|f| f.size).sum();
        info!(
            dir = %dir.display(),
            size_bytes = existing,
            max_size_bytes,
            "Disk store opened"
        );

        Ok(Self {
            dir,
            max_size_bytes,
            size_bytes: AtomicU64::new(existing),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// File path used for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:x}", Sha256::digest(key.as_bytes())))
    }

    /// Deletes oldest-modified files until the store fits its budget.
    pub async fn gc(&self) -> Result<GcResult, DiskStoreError> {
        let start = Instant::now();
        let mut files = scan(&self.dir).await?;
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        let mut result = GcResult::default();

        files.sort_by_key(|f| f.modified);
        for file in files {
            if total <= self.max_size_bytes {
                break;
            }
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    total -= file.size;
                    result.entries_removed += 1;
                    result.bytes_freed += file.size;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    total -= file.size;
                }
                Err(e) => warn!(path = %file.path.display(), error = %e, "Failed to remove cache file"),
            }
        }

        self.size_bytes.store(total, Ordering::Relaxed);
        result.duration_ms = start.elapsed().as_millis() as u64;
        if result.entries_removed > 0 {
            debug!(%result, "Disk store GC");
        }
        Ok(result)
    }
}

impl DiskStore for FsDiskStore {
    fn read(&self, key: &str) -> BoxFuture<'_, Result<Option<Bytes>, DiskStoreError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn write(&self, key: &str, data: Bytes) -> BoxFuture<'_, Result<(), DiskStoreError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let previous = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(_) => 0,
            };

            // Write then rename so readers never see a partial file
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, &data).await?;
            tokio::fs::rename(&tmp, &path).await?;

            let written = data.len() as u64;
            let apply = |size: u64| size.saturating_sub(previous).saturating_add(written);
            let before = self
                .size_bytes
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |size| Some(apply(size)))
                .unwrap_or_else(|size| size);
            let total = apply(before);

            if total > self.max_size_bytes {
                self.gc().await?;
            }
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), DiskStoreError>> {
        Box::pin(async move {
            for file in scan(&self.dir).await? {
                match tokio::fs::remove_file(&file.path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            self.size_bytes.store(0, Ordering::Relaxed);
            debug!(dir = %self.dir.display(), "Disk store cleared");
            Ok(())
        })
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for FsDiskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsDiskStore")
            .field("dir", &self.dir)
            .field("size_bytes", &self.size_bytes())
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}

struct StoredFile {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

async fn scan(dir: &Path) -> io::Result<Vec<StoredFile>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        files.push(StoredFile {
            path: entry.path(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(files)
}
