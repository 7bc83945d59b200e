//! Errors delivered to image request waiters.
//!
//! [`ImageError`] is `Clone` because one pipeline result is broadcast to every
//! waiter coalesced on a key. [`ErrorKind`] groups the variants into the four
//! categories callers usually branch on.

use crate::decode::DecodeError;
use crate::fetch::FetchError;
use crate::request::ResourceError;
use std::fmt;
use thiserror::Error;

/// Terminal error of an image request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    /// Transport failure: unreachable host, timeout, I/O or network access
    /// not allowed by the request.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP status {status} for {resource}")]
    HttpStatus { status: u16, resource: String },

    /// Fetched bytes could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The request was cancelled before completion.
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid identifier or missing resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The manager was invalidated and accepts no more requests.
    #[error("Image manager invalidated")]
    Invalidated,
}

/// Coarse classification of [`ImageError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Decode,
    Cancelled,
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Decode => "decode",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not-found",
        };
        f.write_str(name)
    }
}

impl ImageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::HttpStatus { .. } => ErrorKind::Network,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Cancelled | Self::Invalidated => ErrorKind::Cancelled,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl From<FetchError> for ImageError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::HttpStatus { status, url } => Self::HttpStatus {
                status,
                resource: url,
            },
            FetchError::NotFound(resource) | FetchError::Unsupported(resource) => Self::NotFound(resource),
            FetchError::Cancelled => Self::Cancelled,
            other @ (FetchError::Unreachable { .. }
            | FetchError::Timeout { .. }
            | FetchError::NetworkAccessDenied(_)
            | FetchError::Io { .. }) => Self::Network(other.to_string()),
        }
    }
}

impl From<ResourceError> for ImageError {
    fn from(e: ResourceError) -> Self {
        Self::NotFound(e.to_string())
    }
}
