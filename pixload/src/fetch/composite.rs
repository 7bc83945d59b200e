//! Routing fetcher.

use super::{failed_stream, ByteStream, FetchError, Fetcher, FileFetcher, HttpFetcher};
use crate::executor::Priority;
use crate::request::Resource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Delegates each resource to the first registered fetcher that can handle it.
#[derive(Clone, Default)]
pub struct CompositeFetcher {
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl CompositeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP plus local files, with assets under `asset_root` if given.
    pub fn standard(asset_root: Option<PathBuf>, http_timeout: Duration) -> Result<Self, FetchError> {
        let mut file = FileFetcher::new();
        if let Some(root) = asset_root {
            file = file.with_asset_root(root);
        }
        Ok(Self::new()
            .with(HttpFetcher::with_timeout(http_timeout)?)
            .with(file))
    }

    /// Appends a fetcher; earlier fetchers take precedence.
    pub fn with<F: Fetcher>(self, fetcher: F) -> Self {
        self.with_shared(Arc::new(fetcher))
    }

    /// Appends an already shared fetcher.
    pub fn with_shared(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    fn route(&self, resource: &Resource) -> Option<&Arc<dyn Fetcher>> {
        self.fetchers.iter().find(|f| f.can_handle(resource))
    }
}

impl Fetcher for CompositeFetcher {
    fn name(&self) -> &str {
        "composite"
    }

    fn can_handle(&self, resource: &Resource) -> bool {
        self.route(resource).is_some()
    }

    fn fetch(&self, resource: &Resource, priority: Priority) -> ByteStream {
        match self.route(resource) {
            Some(fetcher) => {
                trace!(fetcher = fetcher.name(), resource = %resource, "Routing fetch");
                fetcher.fetch(resource, priority)
            }
            None => failed_stream(FetchError::Unsupported(resource.to_string())),
        }
    }
}
