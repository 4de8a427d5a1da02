// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Wraps a trained CaptionModel behind the NextWordModel contract
// so the decoder never sees Burn types, and turns a decoded token
// sequence back into text.

use anyhow::Result;
use burn::prelude::*;
use rand::Rng;

use crate::data::batcher::CaptionBatcher;
use crate::domain::error::{CaptionError, CaptionResult};
use crate::domain::features::ExampleInputs;
use crate::domain::traits::{NextWordModel, Vocabulary};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::decoder::AutoregressiveDecoder;
use crate::ml::model::CaptionModel;

pub type InferBackend = burn::backend::Wgpu;

pub struct CaptionPredictor<B: Backend> {
    model: CaptionModel<B>,
    batcher: CaptionBatcher<B>,
}

impl<B: Backend> CaptionPredictor<B> {
    pub fn new(model: CaptionModel<B>, device: B::Device) -> Self {
        Self {
            model,
            batcher: CaptionBatcher::new(device),
        }
    }

    /// Rebuild the saved architecture and load the latest weights.
    pub fn from_checkpoint(ckpt: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg = ckpt.load_model_config()?;
        let model = ckpt.load_model(cfg.init::<B>(&device), &device)?;
        tracing::info!("Model loaded from checkpoint");
        Ok(Self::new(model, device))
    }

    pub fn model(&self) -> &CaptionModel<B> {
        &self.model
    }
}

impl<B: Backend> NextWordModel for CaptionPredictor<B> {
    fn predict(&self, inputs: &ExampleInputs) -> CaptionResult<Vec<f32>> {
        if inputs.local.mode() != self.model.local_mode() {
            return Err(CaptionError::Model(format!(
                "model expects {:?} local context, got {:?}",
                self.model.local_mode(),
                inputs.local.mode()
            )));
        }
        if inputs.window.len() != self.model.max_words() {
            return Err(CaptionError::Model(format!(
                "model expects a window of {} tokens, got {}",
                self.model.max_words(),
                inputs.window.len()
            )));
        }

        let batch = self.batcher.inputs(&[inputs])?;
        self.model
            .forward_probs(batch)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| CaptionError::Model(format!("{e:?}")))
    }
}

/// Decode one caption and render it as text: `(caption, confidence)`.
pub fn caption<M, V, R>(
    model: &M,
    vocab: &V,
    decoder: &AutoregressiveDecoder,
    inputs: &ExampleInputs,
    temperature: f32,
    rng: &mut R,
) -> CaptionResult<(String, f32)>
where
    M: NextWordModel + ?Sized,
    V: Vocabulary,
    R: Rng + ?Sized,
{
    let decoded = decoder.decode(model, inputs, temperature, rng)?;
    let text = vocab.detokenize(&decoded.tokens)?;
    Ok((text, decoded.confidence))
}
