//! The image manager.
//!
//! [`ImageManager`] is the entry point: it turns [`ImageRequest`]s into
//! [`ImageTask`] handles. Every request goes through the same three steps,
//! taken atomically under one lock:
//!
//! 1. **Coalesce**: if a task for the same [`CacheKey`] and the same fetch
//!    options (network access, disk cache, cache policy) is in flight, add a
//!    waiter to it.
//! 2. **Fast path**: otherwise, if the memory cache holds the image, return
//!    an already-resolved handle.
//! 3. **New task**: otherwise create a task, pin the key in the cache and
//!    queue a pipeline on the worker pool.
//!
//! ```text
//! request() ──► [lock: tasks + memory cache] ──► coalesce / hit / new task
//!                                                           │
//!                        WorkerPool (priority) ◄────────────┘
//!                               │
//!              data cache ─► disk store ─► fetcher (retry)
//!                               │
//!                    decode (blocking pool, bounded)
//!                               │
//!              [lock] cache put + deliver to every waiter
//! ```
//!
//! The manager is an explicit service object: cheap to clone, shared by
//! `Arc`, and torn down when the last clone is dropped.

mod config;
mod handle;
mod pipeline;
mod preheat;
mod response;
mod stats;

pub use config::{
    default_decode_concurrency, DiskCacheConfig, ManagerConfig, DEFAULT_DATA_CACHE_SIZE, DEFAULT_DISK_CACHE_SIZE,
    DEFAULT_FETCH_ATTEMPTS, DEFAULT_MAX_CONCURRENT_PREHEATING, DEFAULT_MEMORY_CACHE_SIZE,
};
pub use handle::ImageTask;
pub use response::{CompletionResult, DataSource, ResponseInfo};
pub use stats::{ManagerStats, ManagerStatsSnapshot};

use crate::cache::{DataCache, DiskStore, DiskStoreError, FsDiskStore, MemoryCache, MemoryCacheStats};
use crate::decode::{DecodedImage, Decoder, ImageDecoder};
use crate::error::ImageError;
use crate::executor::{
    IdGenerator, Priority, RetryPolicy, TaskId, TaskState, TaskStateCell, WorkerPool, WorkerPoolConfig,
};
use crate::fetch::{CompositeFetcher, FetchError, Fetcher};
use crate::request::{cache_key, CachePolicy, CacheKey, ImageRequest, Resource};
use handle::WaiterRef;
use parking_lot::Mutex;
use preheat::PreheatState;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Errors building an [`ImageManager`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Failed to create fetcher: {0}")]
    Fetcher(#[from] FetchError),

    #[error("Failed to open disk store: {0}")]
    DiskStore(#[from] DiskStoreError),
}

// =============================================================================
// Internal state
// =============================================================================

struct Waiter {
    priority: Priority,
    registered_at: Instant,
    tx: oneshot::Sender<CompletionResult>,
}

/// The manager's record of one in-flight pipeline.
struct TaskEntry {
    id: TaskId,
    request: ImageRequest,
    cell: Arc<TaskStateCell>,
    token: CancellationToken,
    priority: Priority,
    waiters: HashMap<u64, Waiter>,
}

impl TaskEntry {
    fn effective_priority(&self) -> Priority {
        self.waiters
            .values()
            .map(|w| w.priority)
            .max()
            .unwrap_or(self.priority)
    }
}

/// Registry key of an in-flight task.
///
/// Requests share a pipeline only when they share the cache key and every
/// option that limits where the bytes may come from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TaskKey {
    pub cache: CacheKey,
    pub allow_network_access: bool,
    pub allow_disk_cache: bool,
    pub memory_cache_policy: CachePolicy,
}

impl TaskKey {
    fn new(request: &ImageRequest) -> Self {
        let options = request.options();
        Self {
            cache: cache_key(request),
            allow_network_access: options.allow_network_access,
            allow_disk_cache: options.allow_disk_cache,
            memory_cache_policy: options.memory_cache_policy,
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache)?;
        if !self.allow_network_access {
            f.write_str(" offline")?;
        }
        if !self.allow_disk_cache {
            f.write_str(" no-disk")?;
        }
        if self.memory_cache_policy == CachePolicy::ReloadIgnoringCache {
            f.write_str(" reload")?;
        }
        Ok(())
    }
}

/// Everything guarded by the manager lock.
struct State {
    cache: MemoryCache,
    tasks: HashMap<TaskKey, TaskEntry>,
    preheat: PreheatState,
    invalidated: bool,
}

pub(crate) struct Inner {
    state: Mutex<State>,
    pool: WorkerPool,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder>,
    data_cache: Option<DataCache>,
    disk_store: Option<Arc<dyn DiskStore>>,
    decode_permits: Arc<Semaphore>,
    retry_policy: RetryPolicy,
    max_concurrent_preheating: usize,
    ids: IdGenerator,
    stats: ManagerStats,
    runtime: Handle,
}

/// Snapshot of one outstanding task.
#[derive(Clone, Debug)]
pub struct TaskInfo {
    pub id: TaskId,
    pub key: CacheKey,
    pub request: ImageRequest,
    pub state: TaskState,
    pub priority: Priority,
    pub waiters: usize,
    pub bytes_received: u64,
}

/// Snapshot returned by [`ImageManager::tasks`].
#[derive(Clone, Debug, Default)]
pub struct TasksSnapshot {
    /// In-flight tasks, highest priority first.
    pub tasks: Vec<TaskInfo>,
    /// Keys being preheated, started or still queued.
    pub preheating: Vec<CacheKey>,
}

impl Inner {
    /// Registers a request under the lock and returns its handle.
    fn register(self: &Arc<Self>, state: &mut State, request: ImageRequest) -> ImageTask {
        let start = Instant::now();
        self.stats.record_request();

        if state.invalidated {
            return ImageTask::resolved(
                request,
                CompletionResult::failure(ImageError::Invalidated, ResponseInfo::default()),
            );
        }

        let key = TaskKey::new(&request);
        let priority = request.priority();
        let waiter_id = self.ids.next();
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            priority,
            registered_at: start,
            tx,
        };

        // Coalesce onto the in-flight task
        if let Some(entry) = state.tasks.get_mut(&key) {
            entry.waiters.insert(waiter_id, waiter);
            let task_id = entry.id;
            let cell = Arc::clone(&entry.cell);
            if priority > entry.priority {
                entry.priority = priority;
                self.pool.reprioritize(task_id, priority);
            }
            self.stats.record_coalesced();
            debug!(key = %key, task = %task_id, waiters = entry.waiters.len(), "Request coalesced");

            let waiter = WaiterRef {
                key,
                task_id,
                waiter_id,
            };
            return ImageTask::pending(Arc::downgrade(self), waiter, request, cell, rx);
        }

        // Fast path
        if request.options().memory_cache_policy == CachePolicy::Default {
            if let Some(entry) = state.cache.get(&key.cache) {
                self.stats.record_cache_hit();
                trace!(key = %key, "Memory cache hit");
                let info = ResponseInfo {
                    is_fast_response: true,
                    data_source: Some(DataSource::MemoryCache),
                    duration: start.elapsed(),
                    ..ResponseInfo::default()
                };
                return ImageTask::resolved(request, CompletionResult::success(entry.image, info));
            }
        }

        // New task
        let task_id = TaskId::new(self.ids.next());
        let cell = Arc::new(TaskStateCell::new(TaskState::Pending));
        let token = CancellationToken::new();
        let mut waiters = HashMap::new();
        waiters.insert(waiter_id, waiter);

        state.cache.pin(&key.cache);
        state.tasks.insert(
            key.clone(),
            TaskEntry {
                id: task_id,
                request: request.clone(),
                cell: Arc::clone(&cell),
                token: token.clone(),
                priority,
                waiters,
            },
        );

        let work = pipeline::run(
            Arc::downgrade(self),
            pipeline::Job {
                key: key.clone(),
                task_id,
                request: request.clone(),
                cell: Arc::clone(&cell),
                token,
            },
        );
        self.pool.submit(task_id, priority, Box::pin(work));
        self.stats.record_pipeline_started();
        debug!(key = %key, task = %task_id, priority = %priority, "Task created");

        let waiter = WaiterRef {
            key,
            task_id,
            waiter_id,
        };
        ImageTask::pending(Arc::downgrade(self), waiter, request, cell, rx)
    }

    pub(crate) fn cancel_waiter(&self, waiter: &WaiterRef) {
        let mut state = self.state.lock();
        self.cancel_waiter_locked(&mut state, waiter);
    }

    /// Removes one waiter; cancels the task when it was the last one.
    fn cancel_waiter_locked(&self, state: &mut State, waiter: &WaiterRef) {
        let Entry::Occupied(mut occupied) = state.tasks.entry(waiter.key.clone()) else {
            return;
        };
        if occupied.get().id != waiter.task_id {
            return;
        }

        // Dropping the sender suppresses delivery to this waiter
        occupied.get_mut().waiters.remove(&waiter.waiter_id);

        if occupied.get().waiters.is_empty() {
            let entry = occupied.remove();
            entry.token.cancel();
            let dequeued = self.pool.cancel(entry.id);
            entry.cell.advance(TaskState::Cancelled);
            state.cache.unpin(&waiter.key.cache);
            self.stats.record_pipeline_cancelled();
            debug!(key = %waiter.key, task = %entry.id, dequeued, "Task cancelled");
        } else {
            let entry = occupied.get_mut();
            let effective = entry.effective_priority();
            if effective != entry.priority {
                entry.priority = effective;
                self.pool.reprioritize(entry.id, effective);
            }
            trace!(key = %waiter.key, remaining = entry.waiters.len(), "Waiter removed");
        }
    }

    pub(crate) fn set_waiter_priority(&self, waiter: &WaiterRef, priority: Priority) {
        let mut state = self.state.lock();
        let Some(entry) = state.tasks.get_mut(&waiter.key) else {
            return;
        };
        if entry.id != waiter.task_id {
            return;
        }
        let Some(w) = entry.waiters.get_mut(&waiter.waiter_id) else {
            return;
        };
        w.priority = priority;

        let effective = entry.effective_priority();
        if effective != entry.priority {
            entry.priority = effective;
            let requeued = self.pool.reprioritize(entry.id, effective);
            debug!(key = %waiter.key, task = %entry.id, priority = %effective, requeued, "Task priority changed");
        }
    }

    /// Finishes a task: caches the image and delivers to every waiter.
    ///
    /// Ignored if the task was cancelled or replaced meanwhile.
    fn complete(&self, key: &TaskKey, task_id: TaskId, outcome: pipeline::Outcome) {
        let entry = {
            let mut state = self.state.lock();
            let entry = match state.tasks.entry(key.clone()) {
                Entry::Occupied(occupied) if occupied.get().id == task_id => occupied.remove(),
                _ => return,
            };

            state.cache.unpin(&key.cache);
            if let Ok(image) = &outcome.result {
                state
                    .cache
                    .put(key.cache.clone(), Arc::clone(image), entry.request.options().expiration_age);
            }
            let next = if outcome.result.is_ok() {
                TaskState::Completed
            } else {
                TaskState::Failed
            };
            entry.cell.advance(next);
            entry
        };

        match &outcome.result {
            Ok(image) => {
                self.stats.record_pipeline_succeeded();
                debug!(
                    key = %key,
                    task = %task_id,
                    width = image.width(),
                    height = image.height(),
                    source = ?outcome.data_source,
                    waiters = entry.waiters.len(),
                    "Task completed"
                );
            }
            Err(e) => {
                self.stats.record_pipeline_failed();
                debug!(key = %key, task = %task_id, error = %e, waiters = entry.waiters.len(), "Task failed");
            }
        }

        for waiter in entry.waiters.into_values() {
            let info = ResponseInfo {
                is_fast_response: false,
                data_source: outcome.data_source,
                duration: waiter.registered_at.elapsed(),
                fetched_bytes: outcome.fetched_bytes,
                error: None,
            };
            let _ = waiter
                .tx
                .send(CompletionResult::from_outcome(outcome.result.clone(), info));
        }
    }

    fn invalidate_and_cancel(&self) {
        let entries: Vec<(TaskKey, TaskEntry)> = {
            let mut state = self.state.lock();
            state.invalidated = true;
            state.preheat.clear();
            let entries: Vec<_> = state.tasks.drain().collect();
            for (key, entry) in &entries {
                entry.token.cancel();
                self.pool.cancel(entry.id);
                entry.cell.advance(TaskState::Cancelled);
                state.cache.unpin(&key.cache);
                self.stats.record_pipeline_cancelled();
            }
            entries
        };

        info!(tasks = entries.len(), "Image manager invalidated");
        for (_, entry) in entries {
            for waiter in entry.waiters.into_values() {
                let info = ResponseInfo {
                    duration: waiter.registered_at.elapsed(),
                    ..ResponseInfo::default()
                };
                let _ = waiter
                    .tx
                    .send(CompletionResult::failure(ImageError::Cancelled, info));
            }
        }
    }

    fn snapshot(&self) -> TasksSnapshot {
        let state = self.state.lock();
        let mut tasks: Vec<TaskInfo> = state
            .tasks
            .iter()
            .map(|(key, entry)| TaskInfo {
                id: entry.id,
                key: key.cache.clone(),
                request: entry.request.clone(),
                state: entry.cell.get(),
                priority: entry.priority,
                waiters: entry.waiters.len(),
                bytes_received: entry.cell.bytes_received(),
            })
            .collect();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

        TasksSnapshot {
            tasks,
            preheating: state.preheat.keys(),
        }
    }
}

// =============================================================================
// Public facade
// =============================================================================

/// Deduplicating, cancellable, priority-aware image loader with caching.
///
/// # Example
///
/// ```no_run
/// use pixload::manager::{ImageManager, ManagerConfig};
/// use pixload::request::{ContentMode, ImageRequest, TargetSize};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ImageManager::new(ManagerConfig::default()).await?;
/// let request = ImageRequest::parse("https://example.com/photo.jpg")?
///     .with_target_size(TargetSize::pixels(100, 100))
///     .with_content_mode(ContentMode::AspectFill);
///
/// let task = manager.request(request);
/// if let Some(result) = task.wait().await {
///     let image = result.into_result()?;
///     assert_eq!(image.dimensions(), (100, 100));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ImageManager {
    inner: Arc<Inner>,
}

impl ImageManager {
    /// Builds a manager with the standard fetcher and decoder.
    pub async fn new(config: ManagerConfig) -> Result<Self, BuildError> {
        Self::builder(config).build().await
    }

    /// Starts building a manager with custom collaborators.
    pub fn builder(config: ManagerConfig) -> ImageManagerBuilder {
        ImageManagerBuilder {
            config,
            fetcher: None,
            decoder: None,
            disk_store: None,
            runtime: None,
        }
    }

    /// Requests an image.
    ///
    /// Never blocks. The returned handle is already resolved on a memory
    /// cache hit (see [`ImageTask::is_fast_response`]).
    pub fn request(&self, request: ImageRequest) -> ImageTask {
        let mut state = self.inner.state.lock();
        self.inner.register(&mut state, request)
    }

    /// Requests a resource at full size with default options.
    pub fn request_resource(&self, resource: Resource) -> ImageTask {
        self.request(ImageRequest::new(resource))
    }

    /// Withdraws `task`; see [`ImageTask::cancel`].
    pub fn cancel(&self, task: &ImageTask) {
        task.cancel();
    }

    /// Changes the priority of `task`; see [`ImageTask::set_priority`].
    pub fn set_priority(&self, task: &ImageTask, priority: Priority) {
        task.set_priority(priority);
    }

    /// Loads `requests` in the background at low priority so later requests
    /// hit the cache.
    pub fn start_preheating<I>(&self, requests: I)
    where
        I: IntoIterator<Item = ImageRequest>,
    {
        self.inner.start_preheating(requests);
    }

    /// Stops preheating `requests`, cancelling work nobody else waits on.
    pub fn stop_preheating<I>(&self, requests: I)
    where
        I: IntoIterator<Item = ImageRequest>,
    {
        self.inner.stop_preheating(requests);
    }

    /// Stops all preheating.
    pub fn stop_preheating_all(&self) {
        self.inner.stop_preheating_all();
    }

    /// Snapshot of outstanding tasks and preheating keys.
    pub fn tasks(&self) -> TasksSnapshot {
        self.inner.snapshot()
    }

    /// Clears the memory cache, the data cache and the disk store.
    pub async fn remove_all_cached_images(&self) -> Result<(), DiskStoreError> {
        self.inner.state.lock().cache.clear();
        if let Some(data_cache) = &self.inner.data_cache {
            data_cache.clear().await;
        }
        if let Some(disk_store) = &self.inner.disk_store {
            disk_store.clear().await?;
        }
        info!("All cached images removed");
        Ok(())
    }

    /// Cancels every task, failing their waiters with
    /// [`ImageError::Cancelled`]. Later requests fail with
    /// [`ImageError::Invalidated`].
    pub fn invalidate_and_cancel(&self) {
        self.inner.invalidate_and_cancel();
    }

    /// Returns the cached image for `request` without starting any work.
    pub fn cached_image(&self, request: &ImageRequest) -> Option<Arc<DecodedImage>> {
        let key = cache_key(request);
        let mut state = self.inner.state.lock();
        if state.tasks.keys().any(|k| k.cache == key) {
            return None;
        }
        state.cache.get(&key).map(|entry| entry.image)
    }

    pub fn stats(&self) -> ManagerStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn memory_cache_stats(&self) -> MemoryCacheStats {
        self.inner.state.lock().cache.stats()
    }

    /// Emits the current counters as one `info!` line.
    pub fn log_stats(&self) {
        self.inner.stats.log_stats();
    }
}

impl fmt::Debug for ImageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ImageManager")
            .field("tasks", &state.tasks.len())
            .field("cache", &state.cache)
            .field("queued", &self.inner.pool.queued())
            .field("running", &self.inner.pool.running())
            .finish()
    }
}

/// Builder for [`ImageManager`].
pub struct ImageManagerBuilder {
    config: ManagerConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    decoder: Option<Arc<dyn Decoder>>,
    disk_store: Option<Arc<dyn DiskStore>>,
    runtime: Option<Handle>,
}

impl ImageManagerBuilder {
    /// Uses `fetcher` instead of the standard HTTP + file fetcher.
    pub fn fetcher<F: Fetcher>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn shared_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Uses `decoder` instead of [`ImageDecoder`].
    pub fn decoder<D: Decoder>(mut self, decoder: D) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Uses `store` instead of the configured disk cache.
    pub fn disk_store(mut self, store: Arc<dyn DiskStore>) -> Self {
        self.disk_store = Some(store);
        self
    }

    /// Runs work on `runtime` instead of the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub async fn build(self) -> Result<ImageManager, BuildError> {
        let config = self.config;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| BuildError::NoRuntime(e.to_string()))?,
        };

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(CompositeFetcher::standard(
                config.asset_root.clone(),
                config.http_timeout,
            )?),
        };
        let decoder: Arc<dyn Decoder> = self
            .decoder
            .unwrap_or_else(|| Arc::new(ImageDecoder::new()));

        let disk_store: Option<Arc<dyn DiskStore>> = match (self.disk_store, &config.disk_cache) {
            (Some(store), _) => Some(store),
            (None, Some(disk)) => Some(Arc::new(
                FsDiskStore::open(disk.directory.clone(), disk.max_size_bytes).await?,
            )),
            (None, None) => None,
        };
        let data_cache = (config.data_cache_size > 0).then(|| DataCache::new(config.data_cache_size));

        let pool = WorkerPool::start(
            WorkerPoolConfig {
                max_concurrent: config.max_concurrent_tasks,
            },
            &runtime,
        );

        info!(
            memory_cache_bytes = config.memory_cache_size,
            data_cache_bytes = config.data_cache_size,
            disk_store = disk_store.is_some(),
            fetcher = fetcher.name(),
            max_concurrent_tasks = config.max_concurrent_tasks,
            max_concurrent_decodes = config.max_concurrent_decodes,
            "Image manager started"
        );

        let inner = Inner {
            state: Mutex::new(State {
                cache: MemoryCache::new(config.memory_cache_size),
                tasks: HashMap::new(),
                preheat: PreheatState::default(),
                invalidated: false,
            }),
            pool,
            fetcher,
            decoder,
            data_cache,
            disk_store,
            decode_permits: Arc::new(Semaphore::new(config.max_concurrent_decodes.max(1))),
            retry_policy: config.retry_policy,
            max_concurrent_preheating: config.max_concurrent_preheating.max(1),
            ids: IdGenerator::new(),
            stats: ManagerStats::new(),
            runtime,
        };

        Ok(ImageManager {
            inner: Arc::new(inner),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::request::TargetSize;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(RgbaImage::new(width, height))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    async fn manager_with(fetcher: MemoryFetcher) -> ImageManager {
        ImageManager::builder(ManagerConfig::default().with_retry_policy(RetryPolicy::None))
            .fetcher(fetcher)
            .build()
            .await
            .unwrap()
    }

    async fn wait(task: ImageTask) -> CompletionResult {
        tokio::time::timeout(Duration::from_secs(5), task.wait())
            .await
            .expect("timed out")
            .expect("no completion")
    }

    #[tokio::test]
    async fn test_request_decodes_and_caches() {
        let fetcher = MemoryFetcher::new();
        let request = ImageRequest::parse("a.png").unwrap();
        fetcher.insert(request.resource(), png(40, 20));
        let manager = manager_with(fetcher.clone()).await;

        let result = wait(manager.request(request.clone())).await;
        let image = result.image().unwrap();
        assert_eq!(image.dimensions(), (40, 20));
        assert_eq!(result.info().data_source, Some(DataSource::Fetcher));

        let cached = manager.cached_image(&request).unwrap();
        assert!(Arc::ptr_eq(&cached, image));
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_second_size_reuses_fetched_bytes() {
        let fetcher = MemoryFetcher::new();
        let full = ImageRequest::parse("a.png").unwrap();
        fetcher.insert(full.resource(), png(40, 20));
        let manager = manager_with(fetcher.clone()).await;

        wait(manager.request(full.clone())).await;
        let thumb = full.with_target_size(TargetSize::pixels(10, 10));
        let result = wait(manager.request(thumb)).await;

        assert_eq!(result.image().unwrap().dimensions(), (10, 10));
        assert_eq!(result.info().data_source, Some(DataSource::DataCache));
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_ignoring_cache_refetches() {
        let fetcher = MemoryFetcher::new();
        let request = ImageRequest::parse("a.png").unwrap();
        fetcher.insert(request.resource(), png(4, 4));
        let manager = manager_with(fetcher.clone()).await;

        wait(manager.request(request.clone())).await;
        let reload = request.clone().with_options(
            crate::request::RequestOptions::default().with_memory_cache_policy(CachePolicy::ReloadIgnoringCache),
        );
        let task = manager.request(reload);
        assert!(!task.is_fast_response());
        let result = wait(task).await;

        assert_eq!(result.info().data_source, Some(DataSource::Fetcher));
        assert_eq!(fetcher.fetch_count(), 2);
        assert_eq!(manager.stats().data_cache_hits, 0);

        // Fresh bytes are written back for the next normal request
        let thumb = request.with_target_size(TargetSize::pixels(2, 2));
        let result = wait(manager.request(thumb)).await;
        assert_eq!(result.info().data_source, Some(DataSource::DataCache));
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn test_task_key_separates_fetch_options() {
        let request = ImageRequest::parse("https://example.com/a.png").unwrap();
        let offline = request
            .clone()
            .with_options(crate::request::RequestOptions::default().with_network_access(false));
        let reload = request.clone().with_options(
            crate::request::RequestOptions::default().with_memory_cache_policy(CachePolicy::ReloadIgnoringCache),
        );
        let high = request
            .clone()
            .with_options(crate::request::RequestOptions::default().with_priority(Priority::High));

        let key = TaskKey::new(&request);
        assert_eq!(TaskKey::new(&offline).cache, key.cache);
        assert_ne!(TaskKey::new(&offline), key);
        assert_ne!(TaskKey::new(&reload), key);
        assert_eq!(TaskKey::new(&high), key);
        assert!(TaskKey::new(&offline).to_string().ends_with(" offline"));
    }

    #[tokio::test]
    async fn test_missing_resource_fails_not_found() {
        let manager = manager_with(MemoryFetcher::new()).await;
        let result = wait(manager.request(ImageRequest::parse("missing.png").unwrap())).await;

        assert_eq!(result.error().unwrap().kind(), crate::error::ErrorKind::NotFound);
        assert!(result.info().error.is_some());
        assert_eq!(manager.stats().pipelines_failed, 1);
    }

    #[tokio::test]
    async fn test_network_access_denied() {
        let fetcher = MemoryFetcher::new();
        let request = ImageRequest::parse("https://example.com/a.png").unwrap();
        fetcher.insert(request.resource(), png(4, 4));
        let manager = manager_with(fetcher.clone()).await;

        let offline = request.with_options(crate::request::RequestOptions::default().with_network_access(false));
        let result = wait(manager.request(offline)).await;

        assert_eq!(result.error().unwrap().kind(), crate::error::ErrorKind::Network);
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_bytes_fail_decode() {
        let fetcher = MemoryFetcher::new();
        let request = ImageRequest::parse("bad.png").unwrap();
        fetcher.insert(request.resource(), &b"not an image"[..]);
        let manager = manager_with(fetcher).await;

        let result = wait(manager.request(request)).await;
        assert_eq!(result.error().unwrap().kind(), crate::error::ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_build_without_runtime_handle_uses_current() {
        let manager = ImageManager::new(ManagerConfig::default()).await.unwrap();
        assert!(manager.tasks().tasks.is_empty());
        let debug = format!("{:?}", manager);
        assert!(debug.contains("ImageManager"));
    }
}
