//! Byte retrieval for image resources.
//!
//! A [`Fetcher`] turns a [`Resource`] into a lazy [`ByteStream`] of chunks.
//! Fetchers know nothing about decoding or caching. Dropping the stream
//! aborts the transfer; the manager relies on that for cancellation.
//!
//! # Implementations
//!
//! - [`HttpFetcher`]: `http`/`https` URLs via reqwest
//! - [`FileFetcher`]: `file` URLs and asset names under an asset root
//! - [`MemoryFetcher`]: registered in-memory bytes (tests, bundled images)
//! - [`CompositeFetcher`]: routes each resource to the first fetcher that
//!   can handle it

mod composite;
mod file;
mod http;
mod memory;

pub use composite::CompositeFetcher;
pub use file::{FileFetcher, DEFAULT_CHUNK_SIZE};
pub use http::{HttpFetcher, DEFAULT_HTTP_TIMEOUT};
pub use memory::MemoryFetcher;

use crate::executor::Priority;
use crate::request::Resource;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use thiserror::Error;

/// Lazy stream of byte chunks ending in success or failure.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Errors produced while fetching.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection could not be established.
    #[error("Host unreachable for {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// The request timed out.
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The resource does not exist or the identifier is invalid.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The request forbids network access.
    #[error("Network access not allowed for {0}")]
    NetworkAccessDenied(String),

    /// No configured fetcher understands the resource.
    #[error("No fetcher can handle {0}")]
    Unsupported(String),

    /// Local read failure.
    #[error("I/O error reading {path}: {reason}")]
    Io { path: String, reason: String },

    /// The fetch was cancelled before it finished.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true if retrying may succeed.
    ///
    /// Unreachable hosts, timeouts, 408, 429 and 5xx statuses are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Retrieves raw bytes for resources.
pub trait Fetcher: Send + Sync + 'static {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Returns true if this fetcher can load `resource`.
    fn can_handle(&self, resource: &Resource) -> bool;

    /// Starts fetching `resource`.
    ///
    /// Nothing happens until the stream is polled. `priority` is advisory:
    /// the manager's worker pool already orders work by it before calling
    /// here, and the bundled fetchers ignore it. Transports with their own
    /// request priorities may forward it.
    fn fetch(&self, resource: &Resource, priority: Priority) -> ByteStream;
}

/// A stream that fails immediately with `error`.
pub fn failed_stream(error: FetchError) -> ByteStream {
    stream::once(futures::future::ready(Err(error))).boxed()
}

/// Drains a stream into one buffer, reporting each chunk size to `on_chunk`.
pub async fn collect_bytes<F>(mut stream: ByteStream, mut on_chunk: F) -> Result<Bytes, FetchError>
where
    F: FnMut(usize),
{
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.try_next().await? {
        on_chunk(chunk.len());
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout { url: "u".into() }.is_transient());
        assert!(FetchError::Unreachable {
            url: "u".into(),
            reason: "refused".into()
        }
        .is_transient());
        assert!(FetchError::HttpStatus {
            status: 503,
            url: "u".into()
        }
        .is_transient());
        assert!(FetchError::HttpStatus {
            status: 429,
            url: "u".into()
        }
        .is_transient());
        assert!(!FetchError::HttpStatus {
            status: 404,
            url: "u".into()
        }
        .is_transient());
        assert!(!FetchError::NotFound("a".into()).is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = FetchError::HttpStatus {
            status: 500,
            url: "https://example.com/a.png".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500 from https://example.com/a.png");
    }

    #[tokio::test]
    async fn test_collect_bytes_concatenates_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cde"))];
        let stream = stream::iter(chunks).boxed();
        let mut sizes = Vec::new();

        let bytes = collect_bytes(stream, |n| sizes.push(n)).await.unwrap();
        assert_eq!(&bytes[..], b"abcde");
        assert_eq!(sizes, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_collect_bytes_propagates_error() {
        let chunks = vec![Ok(Bytes::from_static(b"ab")), Err(FetchError::Cancelled)];
        let stream = stream::iter(chunks).boxed();

        let result = collect_bytes(stream, |_| {}).await;
        assert_eq!(result, Err(FetchError::Cancelled));
    }

    #[tokio::test]
    async fn test_failed_stream() {
        let result = collect_bytes(failed_stream(FetchError::NotFound("x".into())), |_| {}).await;
        assert_eq!(result, Err(FetchError::NotFound("x".into())));
    }
}
