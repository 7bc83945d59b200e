//! Image manager configuration.

use crate::executor::{RetryPolicy, DEFAULT_MAX_CONCURRENT_WORK};
use crate::fetch::DEFAULT_HTTP_TIMEOUT;
use std::path::PathBuf;
use std::time::Duration;

/// Default decoded-image memory budget (128 MiB).
pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 128 * 1024 * 1024;

/// Default raw-bytes memory budget (64 MiB).
pub const DEFAULT_DATA_CACHE_SIZE: u64 = 64 * 1024 * 1024;

/// Default disk store budget (512 MiB).
pub const DEFAULT_DISK_CACHE_SIZE: u64 = 512 * 1024 * 1024;

/// Default number of preheating requests running at once.
pub const DEFAULT_MAX_CONCURRENT_PREHEATING: usize = 2;

/// Default fetch attempts for transient failures (initial attempt included).
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Decode concurrency derived from available cores, between 1 and 8.
pub fn default_decode_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .clamp(1, 8)
}

/// Disk store settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskCacheConfig {
    pub directory: PathBuf,
    pub max_size_bytes: u64,
}

impl DiskCacheConfig {
    pub fn new(directory: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        Self {
            directory: directory.into(),
            max_size_bytes,
        }
    }
}

/// Everything needed to build an [`ImageManager`](super::ImageManager).
#[derive(Clone, Debug, PartialEq)]
pub struct ManagerConfig {
    /// Byte budget of the decoded-image cache.
    pub memory_cache_size: usize,
    /// Byte budget of the raw-bytes cache. Zero disables it.
    pub data_cache_size: u64,
    /// Optional on-disk byte store.
    pub disk_cache: Option<DiskCacheConfig>,
    /// Pipelines allowed to run at once.
    pub max_concurrent_tasks: usize,
    /// Decodes allowed to run at once on the blocking pool.
    pub max_concurrent_decodes: usize,
    /// Preheating requests allowed to run at once.
    pub max_concurrent_preheating: usize,
    /// Retry policy for transient fetch failures.
    pub retry_policy: RetryPolicy,
    /// HTTP request timeout for the standard fetcher.
    pub http_timeout: Duration,
    /// Directory used to resolve asset identifiers.
    pub asset_root: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: DEFAULT_MEMORY_CACHE_SIZE,
            data_cache_size: DEFAULT_DATA_CACHE_SIZE,
            disk_cache: None,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_WORK,
            max_concurrent_decodes: default_decode_concurrency(),
            max_concurrent_preheating: DEFAULT_MAX_CONCURRENT_PREHEATING,
            retry_policy: RetryPolicy::exponential(DEFAULT_FETCH_ATTEMPTS),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            asset_root: None,
        }
    }
}

impl ManagerConfig {
    pub fn with_memory_cache_size(mut self, bytes: usize) -> Self {
        self.memory_cache_size = bytes;
        self
    }

    pub fn with_data_cache_size(mut self, bytes: u64) -> Self {
        self.data_cache_size = bytes;
        self
    }

    pub fn with_disk_cache(mut self, disk_cache: DiskCacheConfig) -> Self {
        self.disk_cache = Some(disk_cache);
        self
    }

    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n.max(1);
        self
    }

    pub fn with_max_concurrent_decodes(mut self, n: usize) -> Self {
        self.max_concurrent_decodes = n.max(1);
        self
    }

    pub fn with_max_concurrent_preheating(mut self, n: usize) -> Self {
        self.max_concurrent_preheating = n.max(1);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.memory_cache_size, DEFAULT_MEMORY_CACHE_SIZE);
        assert_eq!(config.max_concurrent_tasks, DEFAULT_MAX_CONCURRENT_WORK);
        assert_eq!(config.max_concurrent_preheating, DEFAULT_MAX_CONCURRENT_PREHEATING);
        assert_eq!(config.retry_policy.max_attempts(), DEFAULT_FETCH_ATTEMPTS);
        assert!(config.disk_cache.is_none());
        assert!((1..=8).contains(&config.max_concurrent_decodes));
    }

    #[test]
    fn test_builders_clamp_concurrency() {
        let config = ManagerConfig::default()
            .with_max_concurrent_tasks(0)
            .with_max_concurrent_decodes(0)
            .with_max_concurrent_preheating(0)
            .with_disk_cache(DiskCacheConfig::new("/tmp/pixload", 1024))
            .with_retry_policy(RetryPolicy::None);

        assert_eq!(config.max_concurrent_tasks, 1);
        assert_eq!(config.max_concurrent_decodes, 1);
        assert_eq!(config.max_concurrent_preheating, 1);
        assert_eq!(config.disk_cache.unwrap().max_size_bytes, 1024);
        assert_eq!(config.retry_policy, RetryPolicy::None);
    }
}
