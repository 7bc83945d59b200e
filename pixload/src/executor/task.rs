//! Task identity and state.
//!
//! A task is the manager's record of one fetch+decode pipeline for a cache
//! key. Its state only moves forward:
//!
//! ```text
//! Pending ──► Running ──┬──► Completed
//!    │                  ├──► Failed
//!    └──────────────────┴──► Cancelled
//! ```
//!
//! [`TaskStateCell`] is shared between the manager and every handle that
//! waits on the task, so handles can observe state and progress without
//! taking the manager lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Unique task identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a task id from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Monotonic id generator for tasks and waiters.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next id.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// State of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Queued, waiting for a worker.
    Pending = 0,
    /// Fetching or decoding.
    Running = 1,
    /// Finished with an image.
    Completed = 2,
    /// Finished with an error.
    Failed = 3,
    /// All waiters left before the task finished.
    Cancelled = 4,
}

impl TaskState {
    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, s) if s.is_terminal() => true,
            _ => false,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Shared, lock-free task state plus download progress.
#[derive(Debug)]
pub struct TaskStateCell {
    state: AtomicU8,
    bytes_received: AtomicU64,
}

impl TaskStateCell {
    /// Creates a cell in the given state.
    pub fn new(state: TaskState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// Returns the current state.
    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempts to move to `next`.
    ///
    /// Returns false and leaves the state untouched if the transition would
    /// go backwards or leave a terminal state.
    pub fn advance(&self, next: TaskState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if !TaskState::from_u8(current).can_transition_to(next) {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Records received bytes.
    pub fn add_progress(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns bytes received so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}
