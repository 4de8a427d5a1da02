// ============================================================
// Layer 3 — Annotation Domain Types
// ============================================================
// An annotation is one described region of one image:
//   - the encoded image bytes (JPEG/PNG, decoded later)
//   - a bounding box in pixel coordinates
//   - one or more human-written descriptions of that region
//
// Box edges follow the (x0, x1, y0, y1) order used by the
// dataset manifests: both horizontal edges first, then both
// vertical edges.

use serde::{Deserialize, Serialize};

use crate::domain::error::{CaptionError, CaptionResult};

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub x1: f32,
    pub y0: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, x1: f32, y0: f32, y1: f32) -> Self {
        Self { x0, x1, y0, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Signed area: negative or zero for inverted or degenerate boxes.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Clamp every edge into `[0, width] x [0, height]`.
    ///
    /// Fails with `InvalidBox` when nothing of positive area is left,
    /// which covers inverted edges, boxes entirely outside the image
    /// and non-finite edges (`clamp` passes NaN through).
    pub fn clamp_to(&self, width: u32, height: u32) -> CaptionResult<Self> {
        let (w, h) = (width as f32, height as f32);
        let clamped = Self {
            x0: self.x0.clamp(0.0, w),
            x1: self.x1.clamp(0.0, w),
            y0: self.y0.clamp(0.0, h),
            y1: self.y1.clamp(0.0, h),
        };
        let finite = [self.x0, self.x1, self.y0, self.y1]
            .iter()
            .all(|v| v.is_finite());
        if !(finite && clamped.width() > 0.0 && clamped.height() > 0.0) {
            return Err(CaptionError::InvalidBox {
                x0: self.x0,
                x1: self.x1,
                y0: self.y0,
                y1: self.y1,
                width,
                height,
            });
        }
        Ok(clamped)
    }

    /// Rescale the box by independent horizontal and vertical factors.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x0: self.x0 * sx,
            x1: self.x1 * sx,
            y0: self.y0 * sy,
            y1: self.y1 * sy,
        }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(b: [f32; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }
}

/// One annotated region: `(image_bytes, box, reference_texts)`.
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Dataset key, kept for log messages.
    pub key: String,
    pub image_bytes: Vec<u8>,
    pub bbox: BoundingBox,
    pub reference_texts: Vec<String>,
}

impl Annotation {
    pub fn new(
        key: impl Into<String>,
        image_bytes: Vec<u8>,
        bbox: BoundingBox,
        reference_texts: Vec<String>,
    ) -> Self {
        Self {
            key: key.into(),
            image_bytes,
            bbox,
            reference_texts,
        }
    }
}
