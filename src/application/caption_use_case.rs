// ============================================================
// Layer 2 — CaptionUseCase
// ============================================================
// Captions one region of one image file with a trained model:
//
//   checkpoint dir → model + vocabulary + example settings
//   image file + box → inference inputs → decoder → text
//
// InferenceContext is shared with the evaluation workflow.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use std::fs;

use crate::data::example::ExampleBuilder;
use crate::domain::annotation::BoundingBox;
use crate::domain::traits::Vocabulary;
use crate::infra::{
    checkpoint::CheckpointManager,
    vocabulary_store::{VocabularyStore, WordVocabulary},
};
use crate::ml::{
    decoder::{AutoregressiveDecoder, Termination},
    inferencer::{caption, CaptionPredictor, InferBackend},
};

#[derive(Debug, Clone)]
pub struct CaptionConfig {
    pub checkpoint_dir: String,
    pub image: String,
    pub bbox: BoundingBox,
    pub temperature: f32,
    /// None uses the termination the model was trained for.
    pub termination: Option<Termination>,
    pub seed: u64,
}

/// Everything needed to caption regions with a saved model.
pub struct InferenceContext {
    pub predictor: CaptionPredictor<InferBackend>,
    pub builder: ExampleBuilder<WordVocabulary>,
    pub decoder: AutoregressiveDecoder,
}

impl InferenceContext {
    pub fn load(checkpoint_dir: &str, termination: Option<Termination>) -> Result<Self> {
        let ckpt = CheckpointManager::new(checkpoint_dir)?;
        let train_cfg = ckpt.load_train_config()?;
        let model_cfg = ckpt.load_model_config()?;
        model_cfg.validate(train_cfg.image_size)?;
        let vocab = VocabularyStore::new(checkpoint_dir).load()?;

        if vocab.vocabulary_size() != model_cfg.vocab_size {
            anyhow::bail!(
                "Vocabulary has {} entries but the model was built for {}",
                vocab.vocabulary_size(),
                model_cfg.vocab_size
            );
        }

        let device = burn::backend::wgpu::WgpuDevice::default();
        let predictor = CaptionPredictor::<InferBackend>::from_checkpoint(&ckpt, device)?;

        let termination = termination.unwrap_or(train_cfg.termination);
        let decoder =
            AutoregressiveDecoder::new(model_cfg.max_words, termination, vocab.end_token());

        let mut example_cfg = train_cfg.example_config();
        example_cfg.max_words = model_cfg.max_words;
        example_cfg.local_mode = model_cfg.local_context;
        let builder = ExampleBuilder::new(vocab, example_cfg);

        Ok(Self {
            predictor,
            builder,
            decoder,
        })
    }
}

pub struct CaptionUseCase {
    config: CaptionConfig,
    context: InferenceContext,
}

impl CaptionUseCase {
    pub fn new(config: CaptionConfig) -> Result<Self> {
        let context = InferenceContext::load(&config.checkpoint_dir, config.termination)?;
        Ok(Self { config, context })
    }

    /// Returns `(caption, confidence)`.
    pub fn execute(&self) -> Result<(String, f32)> {
        let cfg = &self.config;
        let bytes =
            fs::read(&cfg.image).with_context(|| format!("Cannot read image '{}'", cfg.image))?;
        let inputs = self
            .context
            .builder
            .inputs(&bytes, &cfg.bbox)
            .with_context(|| format!("Cannot prepare region {:?} of '{}'", cfg.bbox, cfg.image))?;

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let (text, confidence) = caption(
            &self.context.predictor,
            self.context.builder.vocab(),
            &self.context.decoder,
            &inputs,
            cfg.temperature,
            &mut rng,
        )?;
        tracing::debug!("Captioned '{}' {:?}: {}", cfg.image, cfg.bbox, text);
        Ok((text, confidence))
    }
}
