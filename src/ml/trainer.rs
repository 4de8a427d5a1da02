// ============================================================
// Layer 5 — Training Loop
// ============================================================
// CaptionSession owns the weights, the Adam optimiser and the
// device. One `fit` call = one gradient step on one batch.
//
// The driver runs rounds of `samples_per_round` examples drawn
// from the unbounded batch generator. After every round it:
//   1. appends loss/accuracy to metrics.csv
//   2. saves model_round_N and moves the latest pointer
//   3. greedily captions the first `demo_count` annotations
//
// Burn 0.20 notes:
//   - Training uses Autodiff<B>; session.predictor() calls
//     model.valid() to get the inner-backend model
//   - argmax(1) returns [batch, 1] so we flatten before .equal()
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{CaptionBatch, CaptionBatcher},
    example::ExampleBuilder,
    generator::TrainingBatches,
};
use crate::domain::traits::{AnnotationSource, Vocabulary};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, RoundMetrics},
};
use crate::ml::{
    decoder::AutoregressiveDecoder,
    inferencer::{caption, CaptionPredictor},
    model::{CaptionModel, CaptionModelConfig},
};

pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Result of one gradient step.
#[derive(Debug, Clone, Copy)]
pub struct FitOutput {
    pub loss: f64,
    /// Targets the model ranked first, before the update.
    pub correct: usize,
    pub total: usize,
}

pub struct CaptionSession<B: AutodiffBackend, O> {
    model: CaptionModel<B>,
    optim: O,
    lr: f64,
    device: B::Device,
}

impl<B, O> CaptionSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<CaptionModel<B>, B>,
{
    pub fn new(model: CaptionModel<B>, optim: O, lr: f64, device: B::Device) -> Self {
        Self {
            model,
            optim,
            lr,
            device,
        }
    }

    pub fn model(&self) -> &CaptionModel<B> {
        &self.model
    }

    pub fn fit(&mut self, batch: CaptionBatch<B>) -> FitOutput {
        let total = batch.targets.dims()[0];
        let (loss, logits) = self
            .model
            .forward_loss(batch.inputs, batch.targets.clone());

        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        let correct: i64 = logits
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        // Backward pass + Adam update
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.lr, self.model.clone(), grads);

        FitOutput {
            loss: loss_val,
            correct: correct as usize,
            total,
        }
    }

    /// The current weights on the inner backend, for decoding.
    pub fn predictor(&self) -> CaptionPredictor<B::InnerBackend> {
        CaptionPredictor::new(self.model.valid(), self.device.clone())
    }
}

pub fn run_training<D, V>(
    cfg:       &TrainConfig,
    model_cfg: &CaptionModelConfig,
    dataset:   &D,
    builder:   &ExampleBuilder<V>,
    ckpt:      &CheckpointManager,
    metrics:   &MetricsLogger,
) -> Result<usize>
where
    D: AnnotationSource,
    V: Vocabulary,
{
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<TrainBackend, D, V>(cfg, model_cfg, dataset, builder, ckpt, metrics, device)
}

/// Returns the number of the last completed round.
pub fn train_loop<B, D, V>(
    cfg:       &TrainConfig,
    model_cfg: &CaptionModelConfig,
    dataset:   &D,
    builder:   &ExampleBuilder<V>,
    ckpt:      &CheckpointManager,
    metrics:   &MetricsLogger,
    device:    B::Device,
) -> Result<usize>
where
    B: AutodiffBackend,
    D: AnnotationSource,
    V: Vocabulary,
{
    // ── Build or resume model ─────────────────────────────────────────────────
    let (model, start_round) = if ckpt.has_checkpoint() {
        let round = ckpt.latest_round()?;
        let model = ckpt.load_model(model_cfg.init::<B>(&device), &device)?;
        (model, round)
    } else {
        (model_cfg.init_pretrained::<B>(&device)?, 0)
    };
    tracing::info!(
        "Model ready: vocab={}, wordvec={}, gru={}, local={:?}",
        model_cfg.vocab_size,
        model_cfg.wordvec_size,
        model_cfg.gru_size,
        model_cfg.local_context,
    );

    let optim = AdamConfig::new().with_epsilon(1e-8).init();
    let mut session = CaptionSession::new(model, optim, cfg.lr, device.clone());

    // Reseed per start round so a resumed run does not replay the same draws.
    let seed = cfg.seed.wrapping_add(start_round as u64);
    let mut batches =
        TrainingBatches::new(dataset, builder, StdRng::seed_from_u64(seed), cfg.batch_size);
    let batcher = CaptionBatcher::<B>::new(device);
    let steps = (cfg.samples_per_round / cfg.batch_size.max(1)).max(1);
    let decoder = AutoregressiveDecoder::new(
        model_cfg.max_words,
        cfg.termination,
        builder.vocab().end_token(),
    );

    let mut round = start_round;
    while cfg.rounds == 0 || round < start_round + cfg.rounds {
        round += 1;

        // ── Training phase ────────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut total = 0usize;
        for _ in 0..steps {
            let examples = batches
                .next()
                .context("Batch generator stopped")??;
            let out = session.fit(batcher.batch(examples)?);
            loss_sum += out.loss;
            correct += out.correct;
            total += out.total;
        }
        let avg_loss = loss_sum / steps as f64;
        let accuracy = if total > 0 { correct as f64 / total as f64 } else { 0.0 };

        tracing::info!(
            "Round {:>4} | samples={} | train_loss={:.4} | train_acc={:.1}%",
            round,
            total,
            avg_loss,
            accuracy * 100.0,
        );
        metrics.log(&RoundMetrics::new(round, total, avg_loss, accuracy))?;
        ckpt.save_model(session.model(), round)?;

        // ── Demo captions ─────────────────────────────────────────────────────
        let predictor = session.predictor();
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        for key in dataset.all_keys().into_iter().take(cfg.demo_count) {
            let ann = match dataset.annotation(&key) {
                Ok(ann) => ann,
                Err(e) => {
                    tracing::warn!("Demo annotation '{}' skipped: {}", key, e);
                    continue;
                }
            };
            let inputs = match builder.inputs(&ann.image_bytes, &ann.bbox) {
                Ok(inputs) => inputs,
                Err(e) => {
                    tracing::warn!("Demo annotation '{}' skipped: {}", key, e);
                    continue;
                }
            };
            let (text, confidence) =
                caption(&predictor, builder.vocab(), &decoder, &inputs, 0.0, &mut rng)
                    .context("Demo decoding failed")?;
            let reference = ann.reference_texts.first().map(String::as_str).unwrap_or("");
            tracing::info!("Demo '{}': {} ({:.3}) | ref: {}", key, text, confidence, reference);
        }
    }

    tracing::info!("Training complete!");
    Ok(round)
}
