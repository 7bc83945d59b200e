//! Bounded worker pool with priority dispatch.
//!
//! The [`WorkerPool`] owns a [`PriorityQueue`] of boxed futures and a
//! dispatcher task. The dispatcher acquires a concurrency permit first and
//! only then pops the queue, so while the pool is saturated new work
//! accumulates in the queue and the highest-priority item wins the next
//! free slot.
//!
//! ```text
//! submit() ──► PriorityQueue ──► dispatcher ──► tokio::spawn(work)
//!                  ▲                 │               │
//!   reprioritize() │          Semaphore permit ◄─────┘ (released on finish)
//!   cancel() ──────┘
//! ```

use super::policy::Priority;
use super::queue::PriorityQueue;
use super::task::TaskId;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Default number of pipelines allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_WORK: usize = 6;

/// A unit of work accepted by the pool.
pub type Work = BoxFuture<'static, ()>;

/// Configuration for the worker pool.
#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    /// Maximum number of work items executing concurrently.
    pub max_concurrent: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_WORK,
        }
    }
}

struct PoolShared {
    queue: Mutex<PriorityQueue<Work>>,
    notify: Notify,
    permits: Arc<Semaphore>,
    running: AtomicUsize,
    shutdown: CancellationToken,
}

/// Bounded pool executing prioritized work on a Tokio runtime.
///
/// Dropping the pool stops the dispatcher; queued work is dropped without
/// running, already running work finishes on its own.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    max_concurrent: usize,
}

impl WorkerPool {
    /// Starts a pool whose dispatcher runs on `runtime`.
    pub fn start(config: WorkerPoolConfig, runtime: &Handle) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(PriorityQueue::new()),
            notify: Notify::new(),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            running: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });

        runtime.spawn(dispatch_loop(Arc::clone(&shared), runtime.clone()));
        info!(max_concurrent, "Worker pool started");

        Self {
            shared,
            max_concurrent,
        }
    }

    /// Queues work for a task.
    pub fn submit(&self, task_id: TaskId, priority: Priority, work: Work) {
        self.shared.queue.lock().push(task_id, priority, work);
        trace!(task = %task_id, priority = %priority, "Work queued");
        self.shared.notify.notify_one();
    }

    /// Changes the priority of queued work.
    ///
    /// Returns false if the work is no longer queued (running or finished).
    pub fn reprioritize(&self, task_id: TaskId, priority: Priority) -> bool {
        self.shared.queue.lock().reprioritize(task_id, priority)
    }

    /// Removes queued work so it never runs.
    ///
    /// Returns false if the work already left the queue.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        // Drop the future outside the lock
        let removed = self.shared.queue.lock().remove(task_id);
        removed.is_some()
    }

    /// Number of items waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Number of items currently executing.
    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Configured concurrency limit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stops dispatching and drops all queued work.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let drained = self.shared.queue.lock().drain();
        debug!(dropped = drained.len(), "Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

async fn dispatch_loop(shared: Arc<PoolShared>, runtime: Handle) {
    loop {
        let permit = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let work = loop {
            let next = shared.queue.lock().pop();
            if let Some(work) = next {
                break Some(work);
            }
            tokio::select! {
                biased;
                _ = shared.shutdown.cancelled() => break None,
                _ = shared.notify.notified() => {}
            }
        };
        let Some(work) = work else {
            break;
        };

        trace!(
            task = %work.task_id,
            priority = %work.priority,
            waited_ms = work.wait_time().as_millis() as u64,
            "Dispatching work"
        );

        let pool = Arc::clone(&shared);
        pool.running.fetch_add(1, Ordering::Relaxed);
        runtime.spawn(async move {
            work.item.await;
            pool.running.fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        });
    }
    debug!("Worker pool dispatcher stopped");
}
