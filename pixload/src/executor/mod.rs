//! Work scheduling for image pipelines.
//!
//! - [`policy`]: priorities and retry policies
//! - [`queue`]: re-prioritizable priority queue
//! - [`scheduler`]: bounded worker pool dispatching by priority
//! - [`task`]: task ids and the monotonic task state machine

pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod task;

pub use policy::{Priority, RetryPolicy};
pub use queue::{PriorityQueue, QueuedWork};
pub use scheduler::{Work, WorkerPool, WorkerPoolConfig, DEFAULT_MAX_CONCURRENT_WORK};
pub use task::{IdGenerator, TaskId, TaskState, TaskStateCell};
