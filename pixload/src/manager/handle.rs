//! Caller-side task handle.

use super::response::CompletionResult;
use super::{Inner, TaskKey};
use crate::executor::{Priority, TaskId, TaskState, TaskStateCell};
use crate::request::{CacheKey, ImageRequest};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

/// Identifies one waiter on one task inside the manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WaiterRef {
    pub key: TaskKey,
    pub task_id: TaskId,
    pub waiter_id: u64,
}

/// Handle to one image request.
///
/// Returned by [`ImageManager::request`](super::ImageManager::request). The
/// handle only weakly references the manager. Dropping it does not cancel
/// the work; the result is still cached for later requests. Call
/// [`cancel`](Self::cancel) to withdraw.
pub struct ImageTask {
    manager: Weak<Inner>,
    waiter: Option<WaiterRef>,
    request: ImageRequest,
    cell: Arc<TaskStateCell>,
    priority: Mutex<Priority>,
    cancelled: AtomicBool,
    fast_response: bool,
    receiver: Option<oneshot::Receiver<CompletionResult>>,
}

impl ImageTask {
    /// Handle waiting on an in-flight task.
    pub(crate) fn pending(
        manager: Weak<Inner>,
        waiter: WaiterRef,
        request: ImageRequest,
        cell: Arc<TaskStateCell>,
        receiver: oneshot::Receiver<CompletionResult>,
    ) -> Self {
        let priority = request.priority();
        Self {
            manager,
            waiter: Some(waiter),
            request,
            cell,
            priority: Mutex::new(priority),
            cancelled: AtomicBool::new(false),
            fast_response: false,
            receiver: Some(receiver),
        }
    }

    /// Handle that is already complete.
    pub(crate) fn resolved(request: ImageRequest, result: CompletionResult) -> Self {
        let (tx, receiver) = oneshot::channel();
        let state = if result.is_success() {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        let fast_response = result.info().is_fast_response;
        // The receiver is alive, so this cannot fail
        let _ = tx.send(result);

        let priority = request.priority();
        Self {
            manager: Weak::new(),
            waiter: None,
            request,
            cell: Arc::new(TaskStateCell::new(state)),
            priority: Mutex::new(priority),
            cancelled: AtomicBool::new(false),
            fast_response,
            receiver: Some(receiver),
        }
    }

    /// Waits for the result.
    ///
    /// Returns `None` if this handle was cancelled, or if the manager was
    /// dropped before the task finished. A completion is delivered at most
    /// once.
    pub async fn wait(self) -> Option<CompletionResult> {
        if self.cancelled.load(Ordering::Acquire) {
            return None;
        }
        self.receiver?.await.ok()
    }

    /// Takes the result if it is already available, without waiting.
    ///
    /// Cache hits are available immediately after `request` returns.
    pub fn try_take(&mut self) -> Option<CompletionResult> {
        match self.receiver.as_mut()?.try_recv() {
            Ok(result) => {
                self.receiver = None;
                Some(result)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.receiver = None;
                None
            }
        }
    }

    /// Withdraws this handle's interest.
    ///
    /// The underlying work stops once no other waiter remains. No completion
    /// is delivered to this handle afterwards. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let (Some(waiter), Some(manager)) = (&self.waiter, self.manager.upgrade()) {
            manager.cancel_waiter(waiter);
        }
    }

    /// Changes this handle's priority.
    ///
    /// The task runs at the highest priority among its waiters.
    pub fn set_priority(&self, priority: Priority) {
        *self.priority.lock() = priority;
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if let (Some(waiter), Some(manager)) = (&self.waiter, self.manager.upgrade()) {
            manager.set_waiter_priority(waiter, priority);
        }
    }

    /// State as seen by this handle. A cancelled handle reports `Cancelled`
    /// even while other waiters keep the task running.
    pub fn state(&self) -> TaskState {
        if self.cancelled.load(Ordering::Acquire) {
            TaskState::Cancelled
        } else {
            self.cell.get()
        }
    }

    pub fn priority(&self) -> Priority {
        *self.priority.lock()
    }

    pub fn request(&self) -> &ImageRequest {
        &self.request
    }

    /// Bytes received by the fetch so far.
    pub fn progress(&self) -> u64 {
        self.cell.bytes_received()
    }

    /// True when served synchronously from the memory cache.
    pub fn is_fast_response(&self) -> bool {
        self.fast_response
    }

    /// Id of the underlying task; `None` for handles resolved at request time.
    pub fn task_id(&self) -> Option<TaskId> {
        self.waiter.as_ref().map(|w| w.task_id)
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from(&self.request)
    }

    pub(crate) fn waiter(&self) -> Option<&WaiterRef> {
        self.waiter.as_ref()
    }
}

impl fmt::Debug for ImageTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageTask")
            .field("task_id", &self.task_id())
            .field("resource", &self.request.resource().to_string())
            .field("state", &self.state())
            .field("priority", &self.priority())
            .field("fast_response", &self.fast_response)
            .finish()
    }
}
