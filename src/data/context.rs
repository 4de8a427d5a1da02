// ============================================================
// Layer 4 — Context Encoder
// ============================================================
// Turns a box into the 5-value geometric descriptor fed to the
// context branch of the model:
//
//   [x0/W, y0/H, x1/W, y1/H, (box area)/(image area)]
//
// Pure and unclipped: a box outside the image produces values
// outside [0, 1]. The example builder clamps boxes beforehand.
//
// Gather mode also needs the backbone grid cell under the box
// centre. The backbone downsamples by GRID_STRIDE, so a 224px
// input gives a 7x7 grid. CaptionModelConfig::validate rejects
// gather setups where that does not hold.
//
// Reference: Mao et al. (2016), Generation and Comprehension of
//            Unambiguous Object Descriptions

use crate::domain::annotation::BoundingBox;
use crate::domain::features::{ContextVector, GridCell};

/// Total downsampling factor of the backbone.
pub const GRID_STRIDE: usize = 32;

/// Caller guarantees `width > 0` and `height > 0`.
pub fn context_vector(bbox: &BoundingBox, width: f32, height: f32) -> ContextVector {
    let box_area = (bbox.x1 - bbox.x0) * (bbox.y1 - bbox.y0);
    let img_area = width * height;
    ContextVector([
        bbox.x0 / width,
        bbox.y0 / height,
        bbox.x1 / width,
        bbox.y1 / height,
        box_area / img_area,
    ])
}

/// Grid cell of the box centre. `bbox` must already be expressed in
/// the coordinates of the `image_size` x `image_size` resized image.
pub fn grid_cell(bbox: &BoundingBox, image_size: usize) -> GridCell {
    let cells = (image_size / GRID_STRIDE).max(1);
    let (cx, cy) = bbox.center();
    let to_cell = |v: f32| ((v.max(0.0) as usize) / GRID_STRIDE).min(cells - 1);
    GridCell {
        row: to_cell(cy),
        col: to_cell(cx),
    }
}
