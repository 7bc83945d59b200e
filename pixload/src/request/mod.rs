//! Image requests.
//!
//! An [`ImageRequest`] names a [`Resource`], the [`TargetSize`] in pixels, a
//! [`ContentMode`], and typed [`RequestOptions`]. Requests are immutable once
//! built; the `with_*` methods consume and return a new value.
//!
//! # Example
//!
//! ```
//! use pixload::request::{ContentMode, ImageRequest, TargetSize};
//!
//! let request = ImageRequest::parse("https://example.com/photo.jpg")
//!     .unwrap()
//!     .with_target_size(TargetSize::pixels(100, 100))
//!     .with_content_mode(ContentMode::AspectFill);
//! assert_eq!(request.target_size(), TargetSize::pixels(100, 100));
//! ```

pub mod locator;

pub use locator::{cache_key, fetch_key, CacheKey};

use crate::executor::Priority;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default memory-cache lifetime of a decoded image (10 minutes).
pub const DEFAULT_EXPIRATION_AGE: Duration = Duration::from_secs(600);

/// Prefix for explicit asset identifiers (`asset:icons/logo.png`).
pub const ASSET_SCHEME: &str = "asset";

/// Errors raised while interpreting a resource identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The identifier was empty or whitespace.
    #[error("Empty resource identifier")]
    Empty,

    /// The identifier is a URL with a scheme no fetcher understands.
    #[error("Unsupported URL scheme '{scheme}' in {identifier}")]
    UnsupportedScheme { scheme: String, identifier: String },
}

/// What to load: a URL or an opaque asset identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// `http`, `https` or `file` URL.
    Url(Url),
    /// Asset name resolved by an asset fetcher (for example under a root directory).
    Asset(String),
}

impl Resource {
    /// Parses a resource identifier.
    ///
    /// Absolute `http`, `https` and `file` URLs become [`Resource::Url`];
    /// `asset:name` and anything that is not an absolute URL (such as
    /// `A.jpg`) become [`Resource::Asset`].
    pub fn parse(identifier: &str) -> Result<Self, ResourceError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ResourceError::Empty);
        }

        match Url::parse(identifier) {
            Ok(url) => match url.scheme() {
                "http" | "https" | "file" => Ok(Self::Url(url)),
                ASSET_SCHEME => {
                    let name = identifier[ASSET_SCHEME.len() + 1..].trim_start_matches('/');
                    if name.is_empty() {
                        Err(ResourceError::Empty)
                    } else {
                        Ok(Self::Asset(name.to_string()))
                    }
                }
                scheme => Err(ResourceError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                    identifier: identifier.to_string(),
                }),
            },
            Err(_) => Ok(Self::Asset(identifier.to_string())),
        }
    }

    /// Returns true for resources that need network access.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Url(url) if url.scheme() == "http" || url.scheme() == "https")
    }
}

impl FromStr for Resource {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Url> for Resource {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::Asset(name) => write!(f, "{}:{}", ASSET_SCHEME, name),
        }
    }
}

/// Requested output size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TargetSize {
    /// Native resolution; no resizing, content mode is ignored.
    #[default]
    Maximum,
    /// Bounding box in pixels.
    Pixels { width: u32, height: u32 },
}

impl TargetSize {
    /// Creates a pixel target; zero dimensions are raised to 1.
    pub fn pixels(width: u32, height: u32) -> Self {
        Self::Pixels {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Returns `(width, height)` or `None` for `Maximum`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Maximum => None,
            Self::Pixels { width, height } => Some((*width, *height)),
        }
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maximum => f.write_str("max"),
            Self::Pixels { width, height } => write!(f, "{}x{}", width, height),
        }
    }
}

/// How a source aspect ratio is mapped onto the target size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ContentMode {
    /// Scale to fill the target, cropping the overflow.
    #[default]
    AspectFill,
    /// Scale to fit within the target, never cropping.
    AspectFit,
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AspectFill => f.write_str("fill"),
            Self::AspectFit => f.write_str("fit"),
        }
    }
}

impl FromStr for ContentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fill" | "aspect-fill" | "aspectfill" => Ok(Self::AspectFill),
            "fit" | "aspect-fit" | "aspectfit" => Ok(Self::AspectFit),
            other => Err(format!("unknown content mode: {}", other)),
        }
    }
}

/// Memory cache policy of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// Serve from the memory cache when possible.
    #[default]
    Default,
    /// Skip the memory cache lookup and load from the source. The result is
    /// still stored.
    ReloadIgnoringCache,
}

/// Typed request options.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestOptions {
    /// Scheduling priority. Default `Normal`.
    pub priority: Priority,
    /// Whether remote resources may be downloaded. Default `true`.
    pub allow_network_access: bool,
    /// Whether raw bytes may be read from and written to the disk store.
    /// Default `true`.
    pub allow_disk_cache: bool,
    /// Whether `AspectFill` may crop to the exact target size. Default `true`;
    /// when false the filled image is returned uncropped.
    pub allow_clipping: bool,
    /// Memory cache lookup policy. Default [`CachePolicy::Default`].
    pub memory_cache_policy: CachePolicy,
    /// How long the decoded image stays valid in the memory cache.
    /// Default [`DEFAULT_EXPIRATION_AGE`].
    pub expiration_age: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            allow_network_access: true,
            allow_disk_cache: true,
            allow_clipping: true,
            memory_cache_policy: CachePolicy::Default,
            expiration_age: DEFAULT_EXPIRATION_AGE,
        }
    }
}

impl RequestOptions {
    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Allow or forbid network access.
    pub fn with_network_access(mut self, allow: bool) -> Self {
        self.allow_network_access = allow;
        self
    }

    /// Allow or forbid the disk store.
    pub fn with_disk_cache(mut self, allow: bool) -> Self {
        self.allow_disk_cache = allow;
        self
    }

    /// Allow or forbid cropping in `AspectFill`.
    pub fn with_clipping(mut self, allow: bool) -> Self {
        self.allow_clipping = allow;
        self
    }

    /// Set the memory cache policy.
    pub fn with_memory_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.memory_cache_policy = policy;
        self
    }

    /// Set the memory cache expiration age.
    pub fn with_expiration_age(mut self, age: Duration) -> Self {
        self.expiration_age = age;
        self
    }
}

/// A request for one decoded image.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageRequest {
    resource: Resource,
    target_size: TargetSize,
    content_mode: ContentMode,
    options: RequestOptions,
}

impl ImageRequest {
    /// Creates a full-size request with default options.
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            target_size: TargetSize::Maximum,
            content_mode: ContentMode::AspectFill,
            options: RequestOptions::default(),
        }
    }

    /// Parses the resource identifier and creates a full-size request.
    pub fn parse(identifier: &str) -> Result<Self, ResourceError> {
        Resource::parse(identifier).map(Self::new)
    }

    /// Returns a copy targeting `size`.
    pub fn with_target_size(mut self, size: TargetSize) -> Self {
        self.target_size = size;
        self
    }

    /// Returns a copy using `mode`.
    pub fn with_content_mode(mut self, mode: ContentMode) -> Self {
        self.content_mode = mode;
        self
    }

    /// Returns a copy with `options`.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns a copy with a different priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn target_size(&self) -> TargetSize {
        self.target_size
    }

    pub fn content_mode(&self) -> ContentMode {
        self.content_mode
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn priority(&self) -> Priority {
        self.options.priority
    }
}
