//! Load pipeline run on the worker pool for each task.
//!
//! Stages, each skipped once an earlier one produced bytes:
//!
//! 1. Data cache (raw bytes in memory)
//! 2. Disk store
//! 3. Fetcher, retried on transient failures
//!
//! followed by decoding on the blocking pool under the decode semaphore.
//! A reload request skips both cache reads but still writes the fresh bytes
//! back.

use super::response::DataSource;
use super::{Inner, TaskKey};
use crate::decode::{DecodeError, DecodedImage};
use crate::error::ImageError;
use crate::executor::{TaskId, TaskState, TaskStateCell};
use crate::fetch::{collect_bytes, FetchError};
use crate::request::{fetch_key, CachePolicy, ImageRequest};
use bytes::Bytes;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a pipeline needs besides the manager.
pub(super) struct Job {
    pub key: TaskKey,
    pub task_id: TaskId,
    pub request: ImageRequest,
    pub cell: Arc<TaskStateCell>,
    pub token: CancellationToken,
}

/// What the pipeline hands back to the manager.
pub(super) struct Outcome {
    pub result: Result<Arc<DecodedImage>, ImageError>,
    pub data_source: Option<DataSource>,
    pub fetched_bytes: u64,
}

struct Loaded {
    bytes: Bytes,
    source: DataSource,
    fetched: u64,
}

/// Runs one task to completion unless it is cancelled first.
///
/// Holds only a weak reference while queued so that a dropped manager does
/// not keep pending work alive.
pub(super) async fn run(manager: Weak<Inner>, job: Job) {
    let Some(inner) = manager.upgrade() else {
        return;
    };
    if job.token.is_cancelled() || !job.cell.advance(TaskState::Running) {
        return;
    }

    let outcome = tokio::select! {
        biased;
        _ = job.token.cancelled() => {
            debug!(key = %job.key, task = %job.task_id, "Pipeline stopped by cancellation");
            return;
        }
        outcome = produce(&inner, &job) => outcome,
    };

    inner.complete(&job.key, job.task_id, outcome);
}

async fn produce(inner: &Inner, job: &Job) -> Outcome {
    let loaded = match load(inner, job).await {
        Ok(loaded) => loaded,
        Err(e) => {
            return Outcome {
                result: Err(e.into()),
                data_source: None,
                fetched_bytes: job.cell.bytes_received(),
            }
        }
    };

    let result = decode(inner, job, loaded.bytes).await.map(Arc::new);
    Outcome {
        result,
        data_source: Some(loaded.source),
        fetched_bytes: loaded.fetched,
    }
}

async fn load(inner: &Inner, job: &Job) -> Result<Loaded, FetchError> {
    let resource = job.request.resource();
    let options = job.request.options();
    let key = fetch_key(resource);
    let reload = options.memory_cache_policy == CachePolicy::ReloadIgnoringCache;

    if let Some(data_cache) = inner.data_cache.as_ref().filter(|_| !reload) {
        if let Some(bytes) = data_cache.get(&key).await {
            inner.stats.record_data_cache_hit();
            return Ok(Loaded {
                bytes,
                source: DataSource::DataCache,
                fetched: 0,
            });
        }
    }

    if options.allow_disk_cache && !reload {
        if let Some(disk_store) = &inner.disk_store {
            match disk_store.read(&key).await {
                Ok(Some(bytes)) => {
                    inner.stats.record_disk_hit();
                    if let Some(data_cache) = &inner.data_cache {
                        data_cache.put(key, bytes.clone()).await;
                    }
                    return Ok(Loaded {
                        bytes,
                        source: DataSource::DiskStore,
                        fetched: 0,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Disk store read failed"),
            }
        }
    }

    if resource.is_remote() && !options.allow_network_access {
        return Err(FetchError::NetworkAccessDenied(key));
    }

    let bytes = fetch_with_retry(inner, job).await?;
    let fetched = bytes.len() as u64;
    inner.stats.record_bytes_fetched(fetched);

    if let Some(data_cache) = &inner.data_cache {
        data_cache.put(key.clone(), bytes.clone()).await;
    }
    if options.allow_disk_cache && resource.is_remote() {
        if let Some(disk_store) = &inner.disk_store {
            if let Err(e) = disk_store.write(&key, bytes.clone()).await {
                warn!(key = %key, error = %e, "Disk store write failed");
            }
        }
    }

    Ok(Loaded {
        bytes,
        source: DataSource::Fetcher,
        fetched,
    })
}

async fn fetch_with_retry(inner: &Inner, job: &Job) -> Result<Bytes, FetchError> {
    let mut attempt = 1;
    loop {
        let stream = inner.fetcher.fetch(job.request.resource(), job.request.priority());
        let cell = &job.cell;
        match collect_bytes(stream, |n| cell.add_progress(n as u64)).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_transient() => match inner.retry_policy.delay_for_attempt(attempt) {
                Some(delay) => {
                    inner.stats.record_fetch_retry();
                    debug!(
                        key = %job.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

async fn decode(inner: &Inner, job: &Job, bytes: Bytes) -> Result<DecodedImage, ImageError> {
    // Closed only when the manager is gone
    let _permit = Arc::clone(&inner.decode_permits)
        .acquire_owned()
        .await
        .map_err(|_| ImageError::Cancelled)?;

    let decoder = Arc::clone(&inner.decoder);
    let target = job.request.target_size();
    let mode = job.request.content_mode();
    let allow_clipping = job.request.options().allow_clipping;

    let decoded = inner
        .runtime
        .spawn_blocking(move || decoder.decode(&bytes, target, mode, allow_clipping))
        .await
        .map_err(|e| DecodeError::Malformed(format!("decoder panicked: {}", e)))??;
    Ok(decoded)
}
