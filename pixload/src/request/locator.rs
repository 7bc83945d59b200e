//! Resource locator: canonical keys for requests.
//!
//! Two keys are derived from a request:
//!
//! - the **fetch key** identifies the raw bytes (canonical resource only), and
//!   is shared by every size and mode of one resource;
//! - the [`CacheKey`] identifies decoded output and includes everything that
//!   changes pixels: resource, target size, content mode and clipping.
//!
//! Normalization rules:
//! - URL fragments are dropped; scheme and host case is normalized by `url`.
//! - For `TargetSize::Maximum` the content mode and clipping do not affect
//!   output and are left out of the key.
//! - Clipping only matters for `AspectFill`.

use super::{ContentMode, ImageRequest, Resource, TargetSize, ASSET_SCHEME};
use std::fmt;

/// Identity of a decoded image in the memory cache and task registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    resource: String,
    size: Option<(u32, u32)>,
    mode: Option<ContentModeKey>,
}

/// Content mode as it appears in a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ContentModeKey {
    Fit,
    Fill,
    FillUnclipped,
}

impl CacheKey {
    /// Canonical resource part of the key (equal to the fetch key).
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.size, self.mode) {
            (Some((w, h)), Some(mode)) => {
                let mode = match mode {
                    ContentModeKey::Fit => "fit",
                    ContentModeKey::Fill => "fill",
                    ContentModeKey::FillUnclipped => "fill-noclip",
                };
                write!(f, "{}@{}x{}/{}", self.resource, w, h, mode)
            }
            _ => write!(f, "{}@max", self.resource),
        }
    }
}

impl From<&ImageRequest> for CacheKey {
    fn from(request: &ImageRequest) -> Self {
        cache_key(request)
    }
}

/// Computes the canonical fetch key of a resource.
pub fn fetch_key(resource: &Resource) -> String {
    match resource {
        Resource::Url(url) => {
            let mut url = url.clone();
            url.set_fragment(None);
            url.to_string()
        }
        Resource::Asset(name) => format!("{}:{}", ASSET_SCHEME, name.trim_start_matches('/')),
    }
}

/// Computes the cache key of a request.
pub fn cache_key(request: &ImageRequest) -> CacheKey {
    let resource = fetch_key(request.resource());
    match request.target_size() {
        TargetSize::Maximum => CacheKey {
            resource,
            size: None,
            mode: None,
        },
        TargetSize::Pixels { width, height } => {
            let mode = match request.content_mode() {
                ContentMode::AspectFit => ContentModeKey::Fit,
                ContentMode::AspectFill if request.options().allow_clipping => ContentModeKey::Fill,
                ContentMode::AspectFill => ContentModeKey::FillUnclipped,
            };
            CacheKey {
                resource,
                size: Some((width, height)),
                mode: Some(mode),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Priority;
    use crate::request::RequestOptions;
    use proptest::prelude::*;
    use std::time::Duration;

    fn request(identifier: &str) -> ImageRequest {
        ImageRequest::parse(identifier).unwrap()
    }

    #[test]
    fn test_fetch_key_drops_fragment() {
        let a = Resource::parse("https://Example.com/a.jpg#top").unwrap();
        let b = Resource::parse("https://example.com/a.jpg").unwrap();
        assert_eq!(fetch_key(&a), fetch_key(&b));
        assert_eq!(fetch_key(&b), "https://example.com/a.jpg");
    }

    #[test]
    fn test_fetch_key_for_asset() {
        let a = Resource::parse("asset:/icons/a.png").unwrap();
        let b = Resource::parse("icons/a.png").unwrap();
        assert_eq!(fetch_key(&a), "asset:icons/a.png");
        assert_eq!(fetch_key(&a), fetch_key(&b));
    }

    #[test]
    fn test_maximum_size_ignores_mode_and_clipping() {
        let fill = request("A.jpg").with_content_mode(ContentMode::AspectFill);
        let fit = request("A.jpg")
            .with_content_mode(ContentMode::AspectFit)
            .with_options(RequestOptions::default().with_clipping(false));
        assert_eq!(cache_key(&fill), cache_key(&fit));
        assert_eq!(cache_key(&fill).to_string(), "asset:A.jpg@max");
    }

    #[test]
    fn test_size_and_mode_distinguish_keys() {
        let base = request("A.jpg").with_target_size(TargetSize::pixels(100, 100));
        let fit = base.clone().with_content_mode(ContentMode::AspectFit);
        let bigger = base.clone().with_target_size(TargetSize::pixels(200, 100));

        assert_ne!(cache_key(&base), cache_key(&fit));
        assert_ne!(cache_key(&base), cache_key(&bigger));
        assert_eq!(cache_key(&base).to_string(), "asset:A.jpg@100x100/fill");
    }

    #[test]
    fn test_clipping_only_matters_for_fill() {
        let size = TargetSize::pixels(50, 80);
        let no_clip = RequestOptions::default().with_clipping(false);

        let fill = request("A.jpg").with_target_size(size);
        let fill_no_clip = fill.clone().with_options(no_clip.clone());
        assert_ne!(cache_key(&fill), cache_key(&fill_no_clip));

        let fit = fill.clone().with_content_mode(ContentMode::AspectFit);
        let fit_no_clip = fit.clone().with_options(no_clip);
        assert_eq!(cache_key(&fit), cache_key(&fit_no_clip));
    }

    #[test]
    fn test_non_pixel_options_do_not_affect_key() {
        let base = request("https://example.com/a.jpg").with_target_size(TargetSize::pixels(10, 10));
        let other = base.clone().with_options(
            RequestOptions::default()
                .with_priority(Priority::VeryHigh)
                .with_disk_cache(false)
                .with_expiration_age(Duration::from_secs(1)),
        );
        assert_eq!(cache_key(&base), cache_key(&other));
    }

    proptest! {
        #[test]
        fn prop_cache_key_is_deterministic(
            name in "[a-z]{1,12}\\.(png|jpg)",
            width in 1u32..4096,
            height in 1u32..4096,
            fit in any::<bool>(),
        ) {
            let mode = if fit { ContentMode::AspectFit } else { ContentMode::AspectFill };
            let make = || request(&name)
                .with_target_size(TargetSize::pixels(width, height))
                .with_content_mode(mode);
            prop_assert_eq!(cache_key(&make()), cache_key(&make()));
            let key = cache_key(&make());
            prop_assert_eq!(key.resource(), fetch_key(make().resource()));
        }
    }
}
