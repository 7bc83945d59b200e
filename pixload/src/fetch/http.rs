//! HTTP(S) fetcher using reqwest.

use super::{failed_stream, ByteStream, FetchError, Fetcher};
use crate::executor::Priority;
use crate::request::Resource;
use futures::{stream, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::debug;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Streams response bodies of `http`/`https` URLs.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a fetcher with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unreachable {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = e.status() {
        FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }
    } else {
        FetchError::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, resource: &Resource) -> bool {
        resource.is_remote()
    }

    fn fetch(&self, resource: &Resource, _priority: Priority) -> ByteStream {
        let url = match resource {
            Resource::Url(url) if resource.is_remote() => url.clone(),
            other => return failed_stream(FetchError::Unsupported(other.to_string())),
        };
        let client = self.client.clone();

        stream::once(async move {
            let url_text = url.to_string();
            debug!(url = %url_text, "HTTP GET");

            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| classify(&url_text, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: url_text,
                });
            }

            Ok(response
                .bytes_stream()
                .map_err(move |e| classify(&url_text, e)))
        })
        .try_flatten()
        .boxed()
    }
}
