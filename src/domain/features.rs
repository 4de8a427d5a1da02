// ============================================================
// Layer 3 — Model Input Types
// ============================================================
// The per-example tensors the captioning model consumes, kept as
// plain Rust values (no Burn types) so the data pipeline and the
// decoder can be tested without a device:
//
//   global image  → ImageTensor, the whole image resized
//   local context → either a cropped ImageTensor (dual-crop) or
//                   a cell of the backbone output grid (gather)
//   token window  → TokenWindow (see window.rs)
//   context       → ContextVector, 5 normalised box features

use serde::{Deserialize, Serialize};

use crate::domain::window::TokenWindow;

/// Side length of every image tensor fed to the backbone.
pub const IMG_SIZE: usize = 224;
pub const IMG_CHANNELS: usize = 3;

/// Planar RGB image, `[channels, size, size]` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub size: usize,
    pub pixels: Vec<f32>,
}

impl ImageTensor {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            pixels: vec![0.0; IMG_CHANNELS * size * size],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [IMG_CHANNELS, self.size, self.size]
    }
}

/// `[left, top, right, bottom, box_area / image_area]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextVector(pub [f32; 5]);

impl ContextVector {
    pub fn values(&self) -> &[f32; 5] {
        &self.0
    }
}

/// Row/column of the backbone output grid under the box centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

/// How the model obtains features local to the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LocalContextMode {
    /// Crop the box out of the image and run the backbone a second time.
    #[default]
    DualCrop,
    /// Reuse the global feature map and pick the cell under the box centre.
    Gather,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalContext {
    Crop(ImageTensor),
    Grid(GridCell),
}

impl LocalContext {
    pub fn mode(&self) -> LocalContextMode {
        match self {
            LocalContext::Crop(_) => LocalContextMode::DualCrop,
            LocalContext::Grid(_) => LocalContextMode::Gather,
        }
    }
}

/// Everything the model needs for one next-word prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleInputs {
    pub global: ImageTensor,
    pub local: LocalContext,
    pub window: TokenWindow,
    pub context: ContextVector,
}

/// Inputs plus the ground-truth next token.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub inputs: ExampleInputs,
    pub target: u32,
}

impl TrainingExample {
    /// The target as a one-hot vector over the vocabulary.
    pub fn target_onehot(&self, vocab_size: usize) -> Vec<f32> {
        let mut v = vec![0.0; vocab_size];
        if let Some(slot) = v.get_mut(self.target as usize) {
            *slot = 1.0;
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_onehot() {
        let ex = TrainingExample {
            inputs: ExampleInputs {
                global: ImageTensor::zeros(2),
                local: LocalContext::Grid(GridCell { row: 0, col: 0 }),
                window: TokenWindow::empty(3),
                context: ContextVector([0.0; 5]),
            },
            target: 2,
        };
        assert_eq!(ex.target_onehot(4), vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_image_tensor_shape() {
        let t = ImageTensor::zeros(4);
        assert_eq!(t.shape(), [3, 4, 4]);
        assert_eq!(t.pixels.len(), 48);
    }
}
