// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// One pass over every annotation of a manifest:
//
//   ValidationExamples → decode → score vs. all references
//
// Running means are logged after every item; the final summary
// carries count/min/max/mean/variance per metric.
//
// Reference: Rust Book §10 (Generic Types, Traits)

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::application::caption_use_case::InferenceContext;
use crate::data::{
    dataset::ManifestDataset, example::ExampleBuilder, generator::ValidationExamples,
};
use crate::domain::error::CaptionResult;
use crate::domain::traits::{AnnotationSource, NextWordModel, Vocabulary};
use crate::ml::{
    decoder::{AutoregressiveDecoder, Termination},
    inferencer::caption,
};
use crate::scoring::{score, summary::ScoreSummary};

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub manifest: String,
    pub checkpoint_dir: String,
    pub temperature: f32,
    pub termination: Option<Termination>,
    pub seed: u64,
    /// Stop after this many scored items.
    pub limit: Option<usize>,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<ScoreSummary> {
        let cfg = &self.config;
        let context = InferenceContext::load(&cfg.checkpoint_dir, cfg.termination)?;
        let dataset = ManifestDataset::open(&cfg.manifest)?;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let summary = evaluate(
            &context.predictor,
            &dataset,
            &context.builder,
            &context.decoder,
            cfg.temperature,
            cfg.limit,
            &mut rng,
        )?;

        for (name, stats) in summary.statistics() {
            tracing::info!(
                "{}: n={} min={:.4} max={:.4} mean={:.4} variance={:.6}",
                name,
                stats.count,
                stats.min,
                stats.max,
                stats.mean,
                stats.variance
            );
        }
        Ok(summary)
    }
}

/// Decode and score every annotation of `dataset`. Unusable annotations
/// are skipped; a model failure aborts the run.
pub fn evaluate<M, D, V, R>(
    model: &M,
    dataset: &D,
    builder: &ExampleBuilder<V>,
    decoder: &AutoregressiveDecoder,
    temperature: f32,
    limit: Option<usize>,
    rng: &mut R,
) -> CaptionResult<ScoreSummary>
where
    M: NextWordModel + ?Sized,
    D: AnnotationSource,
    V: Vocabulary,
    R: Rng,
{
    let mut summary = ScoreSummary::new();
    // Example building and decoding draw from separate streams so the
    // decoded captions do not depend on the prefix draws.
    let example_rng = StdRng::seed_from_u64(rng.gen());

    for item in ValidationExamples::new(dataset, builder, example_rng) {
        if limit.is_some_and(|n| summary.len() >= n) {
            break;
        }
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("Skipping validation item: {}", e);
                continue;
            }
        };

        let (text, likelihood) = caption(
            model,
            builder.vocab(),
            decoder,
            &item.example.inputs,
            temperature,
            &mut *rng,
        )?;
        let s = score(&text, &item.references, likelihood);
        summary.add(&s);

        let first_ref = item.references.first().map(String::as_str).unwrap_or("");
        tracing::info!("{:.3} {} ({})", likelihood, text, first_ref);
        if let Some(m) = summary.means() {
            tracing::info!(
                "[{}] bleu1={:.4} bleu2={:.4} rouge={:.4} likelihood={:.4}",
                summary.len(),
                m.bleu1,
                m.bleu2,
                m.rouge,
                m.likelihood
            );
        }
    }
    Ok(summary)
}
