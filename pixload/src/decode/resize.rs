//! Resize geometry for content modes.
//!
//! Pure arithmetic, kept separate from pixel work so the rules are easy to
//! test: `AspectFit` scales by the smaller axis ratio and never exceeds the
//! target; `AspectFill` scales by the larger ratio and then, when clipping is
//! allowed, crops the centered target-sized region.
//!
//! Both modes scale small sources up to the target as well as large ones
//! down, so a thumbnail request always yields target-bounded output.

use crate::request::ContentMode;

/// Rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How to turn a source image into the requested output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizePlan {
    /// Dimensions after scaling.
    pub scaled: (u32, u32),
    /// Region of the scaled image to keep, if cropping.
    pub crop: Option<Rect>,
}

impl ResizePlan {
    /// Final output dimensions.
    pub fn output(&self) -> (u32, u32) {
        match self.crop {
            Some(rect) => (rect.width, rect.height),
            None => self.scaled,
        }
    }

    /// True if the plan leaves the source untouched.
    pub fn is_identity(&self, source: (u32, u32)) -> bool {
        self.scaled == source && self.crop.is_none()
    }
}

/// Computes the resize plan for a source of `source` pixels.
pub fn plan(source: (u32, u32), target: (u32, u32), mode: ContentMode, allow_clipping: bool) -> ResizePlan {
    let (sw, sh) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (tw, th) = (target.0.max(1), target.1.max(1));
    let ratio_w = tw as f64 / sw;
    let ratio_h = th as f64 / sh;

    match mode {
        ContentMode::AspectFit => {
            let scale = ratio_w.min(ratio_h);
            let width = ((sw * scale).round() as u32).clamp(1, tw);
            let height = ((sh * scale).round() as u32).clamp(1, th);
            ResizePlan {
                scaled: (width, height),
                crop: None,
            }
        }
        ContentMode::AspectFill => {
            let scale = ratio_w.max(ratio_h);
            let width = ((sw * scale).round() as u32).max(tw);
            let height = ((sh * scale).round() as u32).max(th);
            let crop = allow_clipping.then(|| Rect {
                x: (width - tw) / 2,
                y: (height - th) / 2,
                width: tw,
                height: th,
            });
            ResizePlan {
                scaled: (width, height),
                crop,
            }
        }
    }
}
