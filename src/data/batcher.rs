// ============================================================
// Layer 4 — Caption Batcher
// ============================================================
// Stacks plain-Rust ExampleInputs into device tensors:
//
//   global   N × [3, S, S]   →  [N, 3, S, S]
//   local    N × [3, S, S]   →  [N, 3, S, S]     (dual-crop)
//            N × (row, col)  →  [N] flat cells   (gather)
//   window   N × [T]         →  [N, T]  Int
//   context  N × [5]         →  [N, 5]
//   target   N               →  [N]     Int
//
// Every example of a batch must use the same local-context mode
// and the same image size. The batcher does not pad: windows
// already have a fixed length.
//
// Reference: Burn Book §4 (Batcher)
//            Rust Book §8 (Vectors)

use burn::prelude::*;

use crate::data::context::GRID_STRIDE;
use crate::domain::error::{CaptionError, CaptionResult};
use crate::domain::features::{ExampleInputs, LocalContext, TrainingExample, IMG_CHANNELS};
use crate::ml::model::{CaptionInputs, LocalBatch};

#[derive(Debug, Clone)]
pub struct CaptionBatch<B: Backend> {
    pub inputs: CaptionInputs<B>,
    /// Ground-truth next tokens, [batch].
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct CaptionBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> CaptionBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, items: Vec<TrainingExample>) -> CaptionResult<CaptionBatch<B>> {
        let targets: Vec<i32> = items.iter().map(|ex| ex.target as i32).collect();
        let inputs: Vec<&ExampleInputs> = items.iter().map(|ex| &ex.inputs).collect();
        Ok(CaptionBatch {
            inputs: self.inputs(&inputs)?,
            targets: Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device),
        })
    }

    /// Model inputs without targets, as used for prediction.
    pub fn inputs(&self, items: &[&ExampleInputs]) -> CaptionResult<CaptionInputs<B>> {
        let first = items
            .first()
            .ok_or_else(|| CaptionError::Model("cannot batch zero examples".to_string()))?;
        let n = items.len();
        let size = first.global.size;
        let steps = first.window.len();
        let mode = first.local.mode();

        for ex in items {
            if ex.global.size != size || ex.window.len() != steps || ex.local.mode() != mode {
                return Err(CaptionError::Model(
                    "examples in a batch disagree on image size, window length or local mode"
                        .to_string(),
                ));
            }
        }

        let global_flat: Vec<f32> = items
            .iter()
            .flat_map(|ex| ex.global.pixels.iter().copied())
            .collect();
        let global = self.images(global_flat, n, size);

        let local = match &first.local {
            LocalContext::Crop(_) => {
                let mut flat = Vec::with_capacity(n * IMG_CHANNELS * size * size);
                for ex in items {
                    if let LocalContext::Crop(crop) = &ex.local {
                        if crop.size != size {
                            return Err(CaptionError::Model(format!(
                                "crop size {} differs from image size {}",
                                crop.size, size
                            )));
                        }
                        flat.extend_from_slice(&crop.pixels);
                    }
                }
                LocalBatch::Crop(self.images(flat, n, size))
            }
            LocalContext::Grid(_) => {
                let cols = (size / GRID_STRIDE).max(1);
                let cells: Vec<i32> = items
                    .iter()
                    .filter_map(|ex| match ex.local {
                        LocalContext::Grid(cell) => Some((cell.row * cols + cell.col) as i32),
                        LocalContext::Crop(_) => None,
                    })
                    .collect();
                LocalBatch::Grid(Tensor::<B, 1, Int>::from_ints(cells.as_slice(), &self.device))
            }
        };

        let words_flat: Vec<i32> = items
            .iter()
            .flat_map(|ex| ex.window.tokens().iter().map(|&t| t as i32))
            .collect();
        let words = Tensor::<B, 1, Int>::from_ints(words_flat.as_slice(), &self.device)
            .reshape([n, steps]);

        let ctx_flat: Vec<f32> = items
            .iter()
            .flat_map(|ex| ex.context.values().iter().copied())
            .collect();
        let context =
            Tensor::<B, 1>::from_floats(ctx_flat.as_slice(), &self.device).reshape([n, 5]);

        Ok(CaptionInputs {
            global,
            local,
            words,
            context,
        })
    }

    fn images(&self, flat: Vec<f32>, n: usize, size: usize) -> Tensor<B, 4> {
        Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([n, IMG_CHANNELS, size, size])
    }
}
