//! pixload - asynchronous image loading with caching and request coalescing
//!
//! The [`ImageManager`] accepts [`ImageRequest`]s (a resource plus a target
//! size and content mode) and hands back [`ImageTask`] handles. Identical
//! requests share one fetch and one decode, finished images land in a
//! byte-budgeted memory cache, and work runs on a bounded, priority-ordered
//! worker pool.
//!
//! # Modules
//!
//! - [`request`]: resources, request options and cache keys
//! - [`fetch`]: byte sources (HTTP, files, in-memory)
//! - [`decode`]: decoding and resizing
//! - [`cache`]: memory, data and disk caches
//! - [`executor`]: priorities, retry policy and the worker pool
//! - [`manager`]: the image manager and task handles
//! - [`config`]: INI configuration file
//! - [`logging`]: tracing subscriber setup

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod logging;
pub mod manager;
pub mod request;

pub use decode::DecodedImage;
pub use error::{ErrorKind, ImageError};
pub use executor::{Priority, TaskState};
pub use manager::{CompletionResult, ImageManager, ImageTask, ManagerConfig, ResponseInfo};
pub use request::{CachePolicy, ContentMode, ImageRequest, RequestOptions, Resource, TargetSize};
