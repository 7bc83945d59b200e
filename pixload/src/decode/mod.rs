//! Image decoding and resizing.
//!
//! The [`Decoder`] trait turns fetched bytes into a [`DecodedImage`] sized
//! for the request. [`ImageDecoder`] is the default implementation backed by
//! the `image` crate; any format it was built with (PNG, JPEG, GIF, WebP, ...)
//! is accepted.
//!
//! Decoding is CPU-bound. The manager runs it on the blocking thread pool,
//! never on the caller's thread.

pub mod resize;

use crate::request::{ContentMode, TargetSize};
use image::imageops::{self, FilterType};
use image::{ImageError as RawImageError, RgbaImage};
use std::fmt;
use thiserror::Error;

pub use resize::{plan, Rect, ResizePlan};

/// Errors produced while decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// No bytes were fetched.
    #[error("No image data")]
    Empty,

    /// The data is not a valid image.
    #[error("Malformed image data: {0}")]
    Malformed(String),

    /// The format is recognized but not supported.
    #[error("Unsupported image format: {0}")]
    Unsupported(String),
}

impl From<RawImageError> for DecodeError {
    fn from(e: RawImageError) -> Self {
        match e {
            RawImageError::Unsupported(inner) => DecodeError::Unsupported(inner.to_string()),
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

/// A decoded RGBA bitmap.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pixels: RgbaImage,
}

impl DecodedImage {
    /// Wraps an RGBA buffer.
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Memory held by the pixel buffer.
    pub fn byte_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// Borrows the pixel buffer.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Consumes the image, returning the pixel buffer.
    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bytes", &self.byte_size())
            .finish()
    }
}

/// Turns raw bytes into a bitmap sized for a request.
pub trait Decoder: Send + Sync + 'static {
    /// Decodes `data` and maps it onto `target` using `mode`.
    ///
    /// `TargetSize::Maximum` returns the native resolution.
    fn decode(
        &self,
        data: &[u8],
        target: TargetSize,
        mode: ContentMode,
        allow_clipping: bool,
    ) -> Result<DecodedImage, DecodeError>;
}

/// Default decoder built on the `image` crate.
#[derive(Clone, Debug)]
pub struct ImageDecoder {
    filter: FilterType,
}

impl ImageDecoder {
    /// Creates a decoder using triangle (bilinear) filtering.
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Creates a decoder using the given resampling filter.
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    fn apply(&self, source: RgbaImage, plan: ResizePlan) -> RgbaImage {
        let dims = source.dimensions();
        let scaled = if plan.scaled == dims {
            source
        } else {
            imageops::resize(&source, plan.scaled.0, plan.scaled.1, self.filter)
        };

        match plan.crop {
            Some(rect) if (rect.width, rect.height) != scaled.dimensions() => {
                imageops::crop_imm(&scaled, rect.x, rect.y, rect.width, rect.height).to_image()
            }
            _ => scaled,
        }
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ImageDecoder {
    fn decode(
        &self,
        data: &[u8],
        target: TargetSize,
        mode: ContentMode,
        allow_clipping: bool,
    ) -> Result<DecodedImage, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }

        let source = image::load_from_memory(data)?.into_rgba8();
        let Some(target) = target.dimensions() else {
            return Ok(DecodedImage::new(source));
        };

        let plan = resize::plan(source.dimensions(), target, mode, allow_clipping);
        if plan.is_identity(source.dimensions()) {
            return Ok(DecodedImage::new(source));
        }
        Ok(DecodedImage::new(self.apply(source, plan)))
    }
}
