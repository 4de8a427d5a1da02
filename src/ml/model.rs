// ============================================================
// Layer 5 — Region Caption Model
// ============================================================
// Next-word prediction from four aligned inputs:
//
//   global image   ─ backbone ─ pool ─ project ─┐
//   local crop/cell ─ backbone ─ pool ─ project ─┤ repeat over T
//   context [5]    ────────────── rescale ───────┘
//   token window [T] ─ embed ─ GRU ─ project ─────┐
//                                                 ▼
//               concat ─ fusion GRU ─ last step ─ logits [V]
//
// LayerNorm stands in for batch normalisation at every stage so
// single-example inference behaves exactly like training.
//
// Reference: Burn Book §3 (Module, Config)
//            Cho et al. (2014) GRU, Ba et al. (2016) Layer Normalization

use burn::{
    nn::{
        gru::{Gru, GruConfig},
        loss::CrossEntropyLossConfig,
        Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{relu, softmax},
};

use crate::data::context::GRID_STRIDE;
use crate::domain::features::LocalContextMode;
use crate::domain::window::PAD_TOKEN;
use crate::ml::backbone::{Backbone, BackboneConfig, FeatureExtractor};

/// Width of the context vector.
pub const CONTEXT_SIZE: usize = 5;

// #[derive(Config)] already provides Clone and serde impls.
#[derive(Config, Debug)]
pub struct CaptionModelConfig {
    pub vocab_size: usize,
    #[config(default = 12)]
    pub max_words: usize,
    #[config(default = 300)]
    pub wordvec_size: usize,
    #[config(default = 1024)]
    pub gru_size: usize,
    #[config(default = "LocalContextMode::DualCrop")]
    pub local_context: LocalContextMode,
    /// Zero the language features at padded window slots.
    #[config(default = false)]
    pub mask_padding: bool,
    #[config(default = "BackboneConfig::new()")]
    pub backbone: BackboneConfig,
}

impl CaptionModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CaptionModel<B> {
        self.assemble(self.backbone.init(device), device)
    }

    /// Like `init`, with the backbone weights read from `backbone.pretrained`.
    pub fn init_pretrained<B: Backend>(&self, device: &B::Device) -> anyhow::Result<CaptionModel<B>> {
        Ok(self.assemble(self.backbone.init_pretrained(device)?, device))
    }

    /// Reject settings the model cannot be built or fed with. Gather
    /// mode flattens grid cells assuming a `GRID_STRIDE` downsampling
    /// of an `image_size` image that divides evenly.
    pub fn validate(&self, image_size: usize) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_words > 0, "max_words must be at least 1");
        anyhow::ensure!(
            self.wordvec_size >= 2,
            "wordvec_size must be at least 2, got {}",
            self.wordvec_size
        );
        anyhow::ensure!(self.gru_size > 0, "gru_size must be at least 1");
        if self.local_context == LocalContextMode::Gather {
            let stride = self.backbone.downsampling();
            anyhow::ensure!(
                stride == GRID_STRIDE,
                "Gather mode needs a backbone that downsamples by {} but {} blocks downsample by {}",
                GRID_STRIDE,
                self.backbone.channels.len(),
                stride
            );
            anyhow::ensure!(
                image_size >= GRID_STRIDE && image_size % GRID_STRIDE == 0,
                "Gather mode needs an image size that is a multiple of {}, got {}",
                GRID_STRIDE,
                image_size
            );
        }
        Ok(())
    }

    fn assemble<B: Backend>(&self, backbone: Backbone<B>, device: &B::Device) -> CaptionModel<B> {
        let visual = self.wordvec_size / 2;
        let channels = backbone.channels();
        let fused = 2 * visual + CONTEXT_SIZE + self.wordvec_size;

        CaptionModel {
            global_proj: VisualProjection::new(channels, visual, device),
            local_proj: VisualProjection::new(channels, visual, device),
            backbone,
            embedding: EmbeddingConfig::new(self.vocab_size, self.wordvec_size).init(device),
            embed_norm: LayerNormConfig::new(self.wordvec_size).init(device),
            language_gru: GruConfig::new(self.wordvec_size, self.gru_size, true).init(device),
            language_norm: LayerNormConfig::new(self.gru_size).init(device),
            language_proj: LinearConfig::new(self.gru_size, self.wordvec_size).init(device),
            language_out_norm: LayerNormConfig::new(self.wordvec_size).init(device),
            fusion_gru: GruConfig::new(fused, self.gru_size, true).init(device),
            fusion_norm: LayerNormConfig::new(self.gru_size).init(device),
            output: LinearConfig::new(self.gru_size, self.vocab_size).init(device),
            max_words: self.max_words,
            gather_local: self.local_context == LocalContextMode::Gather,
            mask_padding: self.mask_padding,
        }
    }
}

/// Normalise → project → normalise, for one visual branch.
#[derive(Module, Debug)]
pub struct VisualProjection<B: Backend> {
    in_norm: LayerNorm<B>,
    proj: Linear<B>,
    out_norm: LayerNorm<B>,
}

impl<B: Backend> VisualProjection<B> {
    fn new(channels: usize, out: usize, device: &B::Device) -> Self {
        Self {
            in_norm: LayerNormConfig::new(channels).init(device),
            proj: LinearConfig::new(channels, out).init(device),
            out_norm: LayerNormConfig::new(out).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.in_norm.forward(x);
        let x = relu(self.proj.forward(x));
        self.out_norm.forward(x)
    }
}

/// Local-context input of a batch, matching the model's LocalContextMode.
#[derive(Debug, Clone)]
pub enum LocalBatch<B: Backend> {
    /// Box crops, [batch, 3, S, S].
    Crop(Tensor<B, 4>),
    /// Flat grid-cell indices (`row * cols + col`), [batch].
    Grid(Tensor<B, 1, Int>),
}

#[derive(Debug, Clone)]
pub struct CaptionInputs<B: Backend> {
    /// [batch, 3, S, S]
    pub global: Tensor<B, 4>,
    pub local: LocalBatch<B>,
    /// Token windows, [batch, max_words].
    pub words: Tensor<B, 2, Int>,
    /// Context vectors, [batch, 5].
    pub context: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct CaptionModel<B: Backend> {
    backbone: Backbone<B>,
    global_proj: VisualProjection<B>,
    local_proj: VisualProjection<B>,
    embedding: Embedding<B>,
    embed_norm: LayerNorm<B>,
    language_gru: Gru<B>,
    language_norm: LayerNorm<B>,
    language_proj: Linear<B>,
    language_out_norm: LayerNorm<B>,
    fusion_gru: Gru<B>,
    fusion_norm: LayerNorm<B>,
    output: Linear<B>,
    max_words: usize,
    gather_local: bool,
    mask_padding: bool,
}

impl<B: Backend> CaptionModel<B> {
    pub fn max_words(&self) -> usize {
        self.max_words
    }

    pub fn local_mode(&self) -> LocalContextMode {
        if self.gather_local {
            LocalContextMode::Gather
        } else {
            LocalContextMode::DualCrop
        }
    }

    /// Re-apply the backbone freezing policy (after loading weights).
    pub fn freeze_backbone(self) -> Self {
        Self {
            backbone: self.backbone.freeze(),
            ..self
        }
    }

    /// inputs → next-word logits, [batch, vocab_size]
    pub fn forward(&self, inputs: CaptionInputs<B>) -> Tensor<B, 2> {
        let steps = self.max_words;

        // ── Visual branch ─────────────────────────────────────────────────────
        // Visual features are identical at every decode step, so each
        // branch is computed once and repeated across the window.
        let fmap = self.backbone.extract(inputs.global);
        let global = self.global_proj.forward(fmap.pooled());
        let local = match inputs.local {
            LocalBatch::Crop(crops) => self.backbone.extract(crops).pooled(),
            LocalBatch::Grid(cells) => fmap.gather(cells),
        };
        let local = self.local_proj.forward(local);

        // ── Context branch ────────────────────────────────────────────────────
        // [0, 1] → [-1, 1]
        let context = inputs.context.sub_scalar(0.5).mul_scalar(2.0);

        // ── Language branch ───────────────────────────────────────────────────
        let language = self.language(inputs.words);

        // ── Fusion ────────────────────────────────────────────────────────────
        let fused = Tensor::cat(
            vec![
                over_time(global, steps),
                over_time(local, steps),
                over_time(context, steps),
                language,
            ],
            2,
        );
        let hidden = self.fusion_gru.forward(fused, None);
        let [batch, t, h] = hidden.dims();
        let last = hidden.slice([0..batch, t - 1..t, 0..h]).reshape([batch, h]);
        self.output.forward(self.fusion_norm.forward(last))
    }

    /// Softmax over the vocabulary, [batch, vocab_size].
    pub fn forward_probs(&self, inputs: CaptionInputs<B>) -> Tensor<B, 2> {
        softmax(self.forward(inputs), 1)
    }

    /// Cross-entropy of the next-word prediction against `targets`, [batch].
    pub fn forward_loss(
        &self,
        inputs: CaptionInputs<B>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(inputs);
        let ce = CrossEntropyLossConfig::new().init(&logits.device());
        let loss = ce.forward(logits.clone(), targets);
        (loss, logits)
    }

    /// Token windows → per-step language features, [batch, steps, wordvec].
    fn language(&self, words: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let mask = words.clone().greater_elem(PAD_TOKEN as i64);
        let x = self.embed_norm.forward(self.embedding.forward(words));
        let x = self.language_norm.forward(self.language_gru.forward(x, None));
        let x = self.language_out_norm.forward(relu(self.language_proj.forward(x)));
        if !self.mask_padding {
            return x;
        }
        let [_, _, width] = x.dims();
        let mask = mask.float().unsqueeze_dim::<3>(2).repeat_dim(2, width);
        x * mask
    }
}

/// [batch, features] → [batch, steps, features]
fn over_time<B: Backend>(x: Tensor<B, 2>, steps: usize) -> Tensor<B, 3> {
    x.unsqueeze_dim::<3>(1).repeat_dim(1, steps)
}
