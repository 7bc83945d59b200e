//! Local file fetcher for `file` URLs and bundled assets.

use super::{failed_stream, ByteStream, FetchError, Fetcher};
use crate::executor::Priority;
use crate::request::Resource;
use futures::{stream, StreamExt, TryStreamExt};
use std::path::{Component, Path, PathBuf};
use tokio_util::io::ReaderStream;

/// Read chunk size for local files.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Streams local files.
///
/// `file` URLs are always handled. Asset names are resolved under the asset
/// root, if one is configured, and may not escape it.
#[derive(Clone, Debug, Default)]
pub struct FileFetcher {
    asset_root: Option<PathBuf>,
    chunk_size: usize,
}

impl FileFetcher {
    /// Creates a fetcher for `file` URLs only.
    pub fn new() -> Self {
        Self {
            asset_root: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Resolves asset names under `root`.
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    /// Sets the read chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn asset_root(&self) -> Option<&Path> {
        self.asset_root.as_deref()
    }

    fn resolve(&self, resource: &Resource) -> Result<PathBuf, FetchError> {
        match resource {
            Resource::Url(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| FetchError::NotFound(url.to_string())),
            Resource::Asset(name) => {
                let root = self
                    .asset_root
                    .as_ref()
                    .ok_or_else(|| FetchError::Unsupported(resource.to_string()))?;
                let relative = Path::new(name);
                let escapes = relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
                if escapes {
                    return Err(FetchError::NotFound(resource.to_string()));
                }
                Ok(root.join(relative))
            }
            other => Err(FetchError::Unsupported(other.to_string())),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> FetchError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FetchError::NotFound(path.display().to_string())
    } else {
        FetchError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

impl Fetcher for FileFetcher {
    fn name(&self) -> &str {
        "file"
    }

    fn can_handle(&self, resource: &Resource) -> bool {
        match resource {
            Resource::Url(url) => url.scheme() == "file",
            Resource::Asset(_) => self.asset_root.is_some(),
        }
    }

    fn fetch(&self, resource: &Resource, _priority: Priority) -> ByteStream {
        let path = match self.resolve(resource) {
            Ok(path) => path,
            Err(e) => return failed_stream(e),
        };
        let chunk_size = self.chunk_size.max(1);

        stream::once(async move {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
            Ok(ReaderStream::with_capacity(file, chunk_size).map_err(move |e| io_error(&path, e)))
        })
        .try_flatten()
        .boxed()
    }
}
