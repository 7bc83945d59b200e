//! Completion values delivered to waiters.

use crate::decode::DecodedImage;
use crate::error::ImageError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where the bytes (or image) of a completion came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Decoded image served from the memory cache.
    MemoryCache,
    /// Raw bytes served from the in-memory data cache.
    DataCache,
    /// Raw bytes read from the disk store.
    DiskStore,
    /// Raw bytes fetched from the resource.
    Fetcher,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MemoryCache => "memory-cache",
            Self::DataCache => "data-cache",
            Self::DiskStore => "disk-store",
            Self::Fetcher => "fetcher",
        };
        f.write_str(name)
    }
}

/// Diagnostics attached to every completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    /// True when served synchronously from the memory cache.
    pub is_fast_response: bool,
    /// Origin of the data, if the pipeline got that far.
    pub data_source: Option<DataSource>,
    /// Time from registration to delivery.
    pub duration: Duration,
    /// Bytes received from the fetcher.
    pub fetched_bytes: u64,
    /// Description of the failure, set exactly when the request failed.
    pub error: Option<String>,
}

/// Terminal result of one image request.
///
/// Holds either an image or an error, never both.
#[derive(Clone, Debug)]
pub struct CompletionResult {
    outcome: Result<Arc<DecodedImage>, ImageError>,
    info: ResponseInfo,
}

impl CompletionResult {
    pub fn success(image: Arc<DecodedImage>, mut info: ResponseInfo) -> Self {
        info.error = None;
        Self {
            outcome: Ok(image),
            info,
        }
    }

    pub fn failure(error: ImageError, mut info: ResponseInfo) -> Self {
        info.error = Some(error.to_string());
        Self {
            outcome: Err(error),
            info,
        }
    }

    pub(crate) fn from_outcome(outcome: Result<Arc<DecodedImage>, ImageError>, info: ResponseInfo) -> Self {
        match outcome {
            Ok(image) => Self::success(image, info),
            Err(error) => Self::failure(error, info),
        }
    }

    pub fn image(&self) -> Option<&Arc<DecodedImage>> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ImageError> {
        self.outcome.as_ref().err()
    }

    pub fn info(&self) -> &ResponseInfo {
        &self.info
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Converts into a plain `Result`, dropping the diagnostics.
    pub fn into_result(self) -> Result<Arc<DecodedImage>, ImageError> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_failure_always_describes_error() {
        let result = CompletionResult::failure(ImageError::Cancelled, ResponseInfo::default());
        assert!(result.image().is_none());
        assert_eq!(result.error(), Some(&ImageError::Cancelled));
        assert_eq!(result.info().error.as_deref(), Some("Request cancelled"));
    }

    #[test]
    fn test_success_clears_error() {
        let info = ResponseInfo {
            error: Some("stale".into()),
            ..ResponseInfo::default()
        };
        let image = Arc::new(DecodedImage::new(RgbaImage::new(1, 1)));
        let result = CompletionResult::success(Arc::clone(&image), info);

        assert!(result.is_success());
        assert!(result.info().error.is_none());
        assert!(Arc::ptr_eq(&result.into_result().unwrap(), &image));
    }
}
