//! Integration tests for the image manager.
//!
//! These tests drive the public API end to end:
//! - Coalescing of identical requests onto one fetch
//! - Memory cache fast path
//! - Cancellation, priorities and invalidation
//! - Preheating, retries and the disk store
//!
//! Run with: `cargo test --test manager_integration`

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use pixload::cache::FsDiskStore;
use pixload::executor::RetryPolicy;
use pixload::fetch::{ByteStream, FetchError, Fetcher, MemoryFetcher};
use pixload::manager::{DataSource, DiskCacheConfig, ImageManager, ManagerConfig};
use pixload::request::fetch_key;
use pixload::{
    CompletionResult, ContentMode, ImageError, ImageRequest, ImageTask, Priority, RequestOptions, Resource,
    TargetSize, TaskState,
};

// ============================================================================
// Helper Functions
// ============================================================================

const WAIT_LIMIT: Duration = Duration::from_secs(5);

fn png_bytes(width: u32, height: u32) -> Bytes {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    Bytes::from(out)
}

fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    let pixels = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(pixels)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(out)
}

fn request(identifier: &str) -> ImageRequest {
    ImageRequest::parse(identifier).unwrap()
}

fn quiet_config() -> ManagerConfig {
    ManagerConfig::default().with_retry_policy(RetryPolicy::None)
}

async fn finish(task: ImageTask) -> CompletionResult {
    tokio::time::timeout(WAIT_LIMIT, task.wait())
        .await
        .expect("task did not finish in time")
        .expect("task delivered no completion")
}

/// Polls `condition` until it holds or the wait limit passes.
async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Fetcher that records every call and holds each fetch until the gate opens.
#[derive(Clone)]
struct GatedFetcher {
    data: Bytes,
    gate: Arc<Semaphore>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl GatedFetcher {
    fn new(data: Bytes) -> Self {
        Self {
            data,
            gate: Arc::new(Semaphore::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Fetcher for GatedFetcher {
    fn name(&self) -> &str {
        "gated"
    }

    fn can_handle(&self, _resource: &Resource) -> bool {
        true
    }

    fn fetch(&self, resource: &Resource, _priority: Priority) -> ByteStream {
        self.calls.lock().push(fetch_key(resource));
        let gate = Arc::clone(&self.gate);
        let data = self.data.clone();
        stream::once(async move {
            let _permit = gate.acquire().await.map_err(|_| FetchError::Cancelled)?;
            Ok(data)
        })
        .boxed()
    }
}

/// Fetcher that times out a fixed number of times before succeeding.
struct FlakyFetcher {
    data: Bytes,
    failures_left: AtomicU32,
    calls: Arc<AtomicU64>,
}

impl Fetcher for FlakyFetcher {
    fn name(&self) -> &str {
        "flaky"
    }

    fn can_handle(&self, _resource: &Resource) -> bool {
        true
    }

    fn fetch(&self, resource: &Resource, _priority: Priority) -> ByteStream {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let failing = self
            .failures_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        let item = if failing {
            Err(FetchError::Timeout {
                url: resource.to_string(),
            })
        } else {
            Ok(self.data.clone())
        };
        stream::iter([item]).boxed()
    }
}

// ============================================================================
// Coalescing and caching
// ============================================================================

#[tokio::test]
async fn test_identical_requests_share_one_fetch() {
    let fetcher = GatedFetcher::new(png_bytes(64, 48));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let first = manager.request(request("photo.png"));
    let second = manager.request(request("photo.png"));
    assert_eq!(first.task_id(), second.task_id());
    assert_eq!(manager.tasks().tasks.len(), 1);
    assert_eq!(manager.tasks().tasks[0].waiters, 2);

    fetcher.open();
    let a = finish(first).await;
    let b = finish(second).await;

    assert!(Arc::ptr_eq(a.image().unwrap(), b.image().unwrap()));
    assert_eq!(fetcher.calls().len(), 1);
    let stats = manager.stats();
    assert_eq!(stats.coalesced, 1);
    assert_eq!(stats.pipelines_started, 1);
    assert_eq!(stats.pipelines_succeeded, 1);
    assert!(manager.tasks().tasks.is_empty());
}

#[tokio::test]
async fn test_repeat_request_is_fast_response() {
    let fetcher = MemoryFetcher::new();
    fetcher.insert(&Resource::parse("photo.png").unwrap(), png_bytes(32, 32));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let first = finish(manager.request(request("photo.png"))).await;
    assert!(!first.info().is_fast_response);

    let mut again = manager.request(request("photo.png"));
    assert!(again.is_fast_response());
    assert_eq!(again.state(), TaskState::Completed);
    let cached = again.try_take().expect("cache hit is available immediately");

    assert_eq!(cached.info().data_source, Some(DataSource::MemoryCache));
    assert!(Arc::ptr_eq(first.image().unwrap(), cached.image().unwrap()));
    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(manager.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_fill_resizes_and_caches_exact_size() {
    let fetcher = MemoryFetcher::new();
    fetcher.insert(&Resource::parse("A.jpg").unwrap(), jpeg_bytes(300, 200));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let thumb = request("A.jpg")
        .with_target_size(TargetSize::pixels(100, 100))
        .with_content_mode(ContentMode::AspectFill);

    // Both issued before the first can complete
    let first = manager.request(thumb.clone());
    let second = manager.request(thumb.clone());
    let result = finish(first).await;
    let image = result.image().unwrap();
    assert_eq!(image.dimensions(), (100, 100));
    assert!(Arc::ptr_eq(image, finish(second).await.image().unwrap()));

    let again = finish(manager.request(thumb.clone())).await;
    assert!(again.info().is_fast_response);
    assert!(Arc::ptr_eq(image, again.image().unwrap()));

    let fit = thumb.with_content_mode(ContentMode::AspectFit);
    let fitted = finish(manager.request(fit)).await;
    assert_eq!(fitted.image().unwrap().dimensions(), (100, 67));
    assert_eq!(fetcher.fetch_count(), 1);
}

// ============================================================================
// Cancellation and priorities
// ============================================================================

#[tokio::test]
async fn test_cancelled_task_delivers_nothing() {
    let fetcher = GatedFetcher::new(png_bytes(8, 8));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let task = manager.request(request("photo.png"));
    manager.cancel(&task);
    assert_eq!(task.state(), TaskState::Cancelled);

    fetcher.open();
    let delivered = tokio::time::timeout(WAIT_LIMIT, task.wait()).await.unwrap();
    assert!(delivered.is_none());

    assert!(manager.tasks().tasks.is_empty());
    assert_eq!(manager.stats().pipelines_cancelled, 1);
    assert!(manager.cached_image(&request("photo.png")).is_none());
}

#[tokio::test]
async fn test_cancel_while_running_delivers_nothing() {
    let fetcher = GatedFetcher::new(png_bytes(8, 8));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let task = manager.request(request("photo.png"));
    eventually(|| fetcher.calls().len() == 1).await;
    assert_eq!(task.state(), TaskState::Running);

    task.cancel();
    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(manager.tasks().tasks.is_empty());

    fetcher.open();
    let delivered = tokio::time::timeout(WAIT_LIMIT, task.wait()).await.unwrap();
    assert!(delivered.is_none());

    // The stopped pipeline must not complete or cache anything later
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = manager.stats();
    assert_eq!(stats.pipelines_cancelled, 1);
    assert_eq!(stats.pipelines_succeeded, 0);
    assert!(manager.cached_image(&request("photo.png")).is_none());
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_cancelling_one_waiter_keeps_the_other() {
    let fetcher = GatedFetcher::new(png_bytes(8, 8));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let leaving = manager.request(request("photo.png"));
    let staying = manager.request(request("photo.png"));
    leaving.cancel();
    leaving.cancel();

    fetcher.open();
    assert!(finish(staying).await.is_success());
    assert!(tokio::time::timeout(WAIT_LIMIT, leaving.wait()).await.unwrap().is_none());
    assert_eq!(manager.stats().pipelines_cancelled, 0);
}

#[tokio::test]
async fn test_queued_work_runs_in_priority_order() {
    let fetcher = GatedFetcher::new(png_bytes(4, 4));
    let manager = ImageManager::builder(quiet_config().with_max_concurrent_tasks(1))
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let blocker = manager.request(request("blocker.png"));
    eventually(|| fetcher.calls().len() == 1).await;

    let low = manager.request(request("low.png").with_priority(Priority::Low));
    let normal = manager.request(request("normal.png"));
    let high = manager.request(request("high.png").with_priority(Priority::High));

    // Raised past everything else while still queued
    let late = manager.request(request("late.png").with_priority(Priority::Low));
    late.set_priority(Priority::VeryHigh);

    fetcher.open();
    for task in [blocker, low, normal, high, late] {
        assert!(finish(task).await.is_success());
    }

    let order: Vec<String> = fetcher
        .calls()
        .into_iter()
        .map(|key| key.trim_start_matches("asset:").to_string())
        .collect();
    assert_eq!(order, ["blocker.png", "late.png", "high.png", "normal.png", "low.png"]);
}

#[tokio::test]
async fn test_shared_task_runs_at_highest_waiter_priority() {
    let fetcher = GatedFetcher::new(png_bytes(4, 4));
    let manager = ImageManager::builder(quiet_config().with_max_concurrent_tasks(1))
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let blocker = manager.request(request("blocker.png"));
    eventually(|| fetcher.calls().len() == 1).await;

    let eager = manager.request(request("shared.png").with_priority(Priority::High));
    let patient = manager.request(request("shared.png").with_priority(Priority::Low));
    let normal = manager.request(request("normal.png"));
    assert_eq!(eager.task_id(), patient.task_id());

    let shared_priority = || {
        manager
            .tasks()
            .tasks
            .into_iter()
            .find(|t| Some(t.id) == eager.task_id())
            .map(|t| t.priority)
    };
    assert_eq!(shared_priority(), Some(Priority::High));

    // Lowering the only high waiter drops the shared task below normal work
    eager.set_priority(Priority::Low);
    assert_eq!(shared_priority(), Some(Priority::Low));

    fetcher.open();
    for task in [blocker, eager, patient, normal] {
        assert!(finish(task).await.is_success());
    }

    let order: Vec<String> = fetcher
        .calls()
        .into_iter()
        .map(|key| key.trim_start_matches("asset:").to_string())
        .collect();
    assert_eq!(order, ["blocker.png", "normal.png", "shared.png"]);
}

#[tokio::test]
async fn test_invalidate_fails_waiters_and_later_requests() {
    let fetcher = GatedFetcher::new(png_bytes(4, 4));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let pending = manager.request(request("photo.png"));
    manager.invalidate_and_cancel();

    let result = finish(pending).await;
    assert_eq!(result.error(), Some(&ImageError::Cancelled));

    let mut later = manager.request(request("other.png"));
    let rejected = later.try_take().unwrap();
    assert_eq!(rejected.error(), Some(&ImageError::Invalidated));
    assert!(manager.tasks().tasks.is_empty());
}

#[tokio::test]
async fn test_network_access_denied_for_remote_resource() {
    let fetcher = MemoryFetcher::new();
    let resource = Resource::parse("https://images.example.com/a.png").unwrap();
    fetcher.insert(&resource, png_bytes(4, 4));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let offline = ImageRequest::new(resource).with_options(RequestOptions::default().with_network_access(false));
    let result = finish(manager.request(offline)).await;

    assert!(matches!(result.error(), Some(ImageError::Network(_))));
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_normal_request_is_not_merged_onto_offline_one() {
    let fetcher = MemoryFetcher::new();
    let resource = Resource::parse("https://example.com/a.png").unwrap();
    fetcher.insert(&resource, png_bytes(4, 4));
    let manager = ImageManager::builder(quiet_config().with_max_concurrent_tasks(1))
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let offline =
        ImageRequest::new(resource.clone()).with_options(RequestOptions::default().with_network_access(false));
    let offline = manager.request(offline);
    let online = manager.request(ImageRequest::new(resource));
    assert_ne!(offline.task_id(), online.task_id());
    assert_eq!(manager.tasks().tasks.len(), 2);

    let denied = finish(offline).await;
    assert!(matches!(denied.error(), Some(ImageError::Network(_))));
    assert!(finish(online).await.is_success());
    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(manager.stats().coalesced, 0);
}

// ============================================================================
// Preheating, retry and disk store
// ============================================================================

#[tokio::test]
async fn test_preheating_fills_the_cache() {
    let fetcher = MemoryFetcher::new();
    let names: Vec<String> = (0..6).map(|i| format!("tile-{}.png", i)).collect();
    for name in &names {
        fetcher.insert(&Resource::parse(name).unwrap(), png_bytes(16, 16));
    }
    let manager = ImageManager::builder(quiet_config().with_max_concurrent_preheating(2))
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    let requests: Vec<ImageRequest> = names.iter().map(|n| request(n)).collect();
    manager.start_preheating(requests.clone());
    // Duplicate start is a no-op
    manager.start_preheating(requests.clone());
    assert!(manager.tasks().preheating.len() <= names.len());

    eventually(|| manager.tasks().preheating.is_empty()).await;
    eventually(|| manager.tasks().tasks.is_empty()).await;

    for request in requests {
        assert!(manager.request(request).is_fast_response());
    }
    assert_eq!(fetcher.fetch_count(), names.len() as u64);
}

#[tokio::test]
async fn test_stop_preheating_cancels_unshared_work() {
    let fetcher = GatedFetcher::new(png_bytes(4, 4));
    let manager = ImageManager::builder(quiet_config().with_max_concurrent_preheating(1))
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();

    manager.start_preheating([request("a.png"), request("b.png")]);
    assert_eq!(manager.tasks().tasks.len(), 1);
    assert_eq!(manager.tasks().tasks[0].priority, Priority::Low);

    manager.stop_preheating_all();
    assert!(manager.tasks().tasks.is_empty());
    assert!(manager.tasks().preheating.is_empty());
    assert_eq!(manager.stats().pipelines_cancelled, 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let calls = Arc::new(AtomicU64::new(0));
    let fetcher = FlakyFetcher {
        data: png_bytes(4, 4),
        failures_left: AtomicU32::new(2),
        calls: Arc::clone(&calls),
    };
    let config = ManagerConfig::default().with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1)));
    let manager = ImageManager::builder(config).fetcher(fetcher).build().await.unwrap();

    let result = finish(manager.request(request("https://example.com/flaky.png"))).await;
    assert!(result.is_success());
    assert_eq!(calls.load(Ordering::Relaxed), 3);
    assert_eq!(manager.stats().fetch_retries, 2);
}

#[tokio::test]
async fn test_retries_give_up_after_max_attempts() {
    let fetcher = FlakyFetcher {
        data: png_bytes(4, 4),
        failures_left: AtomicU32::new(10),
        calls: Arc::new(AtomicU64::new(0)),
    };
    let config = ManagerConfig::default().with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(1)));
    let manager = ImageManager::builder(config).fetcher(fetcher).build().await.unwrap();

    let result = finish(manager.request(request("https://example.com/flaky.png"))).await;
    assert_eq!(result.error().map(|e| e.kind()), Some(pixload::ErrorKind::Network));
}

#[tokio::test]
async fn test_disk_store_survives_manager_restart() {
    let dir = tempfile::tempdir().unwrap();
    let resource = Resource::parse("https://images.example.com/photo.png").unwrap();
    let fetcher = MemoryFetcher::new();
    fetcher.insert(&resource, png_bytes(20, 10));

    let config = quiet_config().with_disk_cache(DiskCacheConfig::new(dir.path(), 1024 * 1024));
    let first = ImageManager::builder(config.clone())
        .fetcher(fetcher.clone())
        .build()
        .await
        .unwrap();
    let fetched = finish(first.request(ImageRequest::new(resource.clone()))).await;
    assert_eq!(fetched.info().data_source, Some(DataSource::Fetcher));
    drop(first);

    let second = ImageManager::builder(config)
        .fetcher(MemoryFetcher::new())
        .build()
        .await
        .unwrap();
    let restored = finish(second.request(ImageRequest::new(resource))).await;

    assert_eq!(restored.info().data_source, Some(DataSource::DiskStore));
    assert_eq!(restored.image().unwrap().dimensions(), (20, 10));
    assert_eq!(second.stats().disk_hits, 1);
}

#[tokio::test]
async fn test_remove_all_cached_images() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsDiskStore::open(dir.path(), 1024 * 1024).await.unwrap());
    let resource = Resource::parse("https://images.example.com/photo.png").unwrap();
    let fetcher = MemoryFetcher::new();
    fetcher.insert(&resource, png_bytes(4, 4));
    let manager = ImageManager::builder(quiet_config())
        .fetcher(fetcher.clone())
        .disk_store(store.clone())
        .build()
        .await
        .unwrap();

    finish(manager.request(ImageRequest::new(resource.clone()))).await;
    assert!(pixload::cache::DiskStore::size_bytes(store.as_ref()) > 0);

    manager.remove_all_cached_images().await.unwrap();
    assert_eq!(manager.memory_cache_stats().entry_count, 0);
    assert_eq!(pixload::cache::DiskStore::size_bytes(store.as_ref()), 0);

    let reloaded = finish(manager.request(ImageRequest::new(resource))).await;
    assert_eq!(reloaded.info().data_source, Some(DataSource::Fetcher));
    assert_eq!(fetcher.fetch_count(), 2);
}
