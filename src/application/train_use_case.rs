// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the training pipeline in order:
//
//   Step 1: Open the annotation manifest    (Layer 4 - data)
//   Step 2: Build / load the vocabulary     (Layer 6 - infra)
//   Step 3: Resolve the model architecture  (Layer 6 - infra)
//   Step 4: Build the example builder       (Layer 4 - data)
//   Step 5: Run the training rounds         (Layer 5 - ml)
//
// A checkpoint directory that already holds a model resumes from
// its latest round with the saved architecture.
//
// Reference: Rust Book §5 (Structs, struct update syntax)

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::ManifestDataset,
    example::{ExampleBuilder, ExampleConfig},
};
use crate::domain::{features::LocalContextMode, traits::Vocabulary};
use crate::infra::{
    checkpoint::CheckpointManager, metrics::MetricsLogger, vocabulary_store::VocabularyStore,
};
use crate::ml::{
    backbone::BackboneConfig,
    decoder::Termination,
    model::CaptionModelConfig,
    trainer::run_training,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Serialisable so it can be saved next to the checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub manifest: String,
    pub checkpoint_dir: String,
    /// Upper bound; the built vocabulary can be smaller.
    pub vocab_size: usize,
    pub max_words: usize,
    pub wordvec_size: usize,
    pub gru_size: usize,
    pub local_context: LocalContextMode,
    pub mask_padding: bool,
    pub termination: Termination,
    pub image_size: usize,
    pub backbone_channels: Vec<usize>,
    pub trainable_tail: usize,
    pub backbone_weights: Option<String>,
    pub batch_size: usize,
    pub samples_per_round: usize,
    /// Rounds to run in this invocation; 0 runs until interrupted.
    pub rounds: usize,
    pub lr: f64,
    pub seed: u64,
    /// Annotations captioned after every round as a progress check.
    pub demo_count: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            manifest: "data/regions.json".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            vocab_size: 10_000,
            max_words: 12,
            wordvec_size: 300,
            gru_size: 1024,
            local_context: LocalContextMode::DualCrop,
            mask_padding: false,
            termination: Termination::FixedLength,
            image_size: 224,
            backbone_channels: vec![32, 64, 128, 256, 512],
            trainable_tail: 2,
            backbone_weights: None,
            batch_size: 32,
            samples_per_round: 4096,
            rounds: 0,
            lr: 1e-3,
            seed: 42,
            demo_count: 4,
        }
    }
}

impl TrainConfig {
    pub fn example_config(&self) -> ExampleConfig {
        ExampleConfig {
            max_words: self.max_words,
            image_size: self.image_size,
            local_mode: self.local_context,
            append_end: self.termination == Termination::StopToken,
        }
    }

    /// The architecture of a fresh run. Fails on settings the model
    /// cannot be built or fed with.
    pub fn model_config(&self, vocab_size: usize) -> Result<CaptionModelConfig> {
        let backbone = BackboneConfig::new()
            .with_channels(self.backbone_channels.clone())
            .with_trainable_tail(self.trainable_tail)
            .with_pretrained(self.backbone_weights.clone());
        let model_cfg = CaptionModelConfig::new(vocab_size)
            .with_max_words(self.max_words)
            .with_wordvec_size(self.wordvec_size)
            .with_gru_size(self.gru_size)
            .with_local_context(self.local_context)
            .with_mask_padding(self.mask_padding)
            .with_backbone(backbone);
        model_cfg.validate(self.image_size)?;
        Ok(model_cfg)
    }

    /// This config continuing the run that saved `saved`.
    ///
    /// Everything that shapes the model or its training examples comes
    /// from `saved`; only the schedule (rounds, batch size, learning
    /// rate, seed, demos) follows the current command line.
    pub fn resumed_from(&self, saved: &TrainConfig) -> TrainConfig {
        if saved.termination != self.termination {
            tracing::warn!(
                "Checkpoint was trained with {:?} termination, ignoring {:?}",
                saved.termination,
                self.termination
            );
        }
        TrainConfig {
            vocab_size: saved.vocab_size,
            max_words: saved.max_words,
            wordvec_size: saved.wordvec_size,
            gru_size: saved.gru_size,
            local_context: saved.local_context,
            mask_padding: saved.mask_padding,
            termination: saved.termination,
            image_size: saved.image_size,
            backbone_channels: saved.backbone_channels.clone(),
            trainable_tail: saved.trainable_tail,
            backbone_weights: saved.backbone_weights.clone(),
            ..self.clone()
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cli_cfg = &self.config;

        // ── Step 1: Annotations ───────────────────────────────────────────────
        let dataset = ManifestDataset::open(&cli_cfg.manifest)?;
        if dataset.is_empty() {
            anyhow::bail!("Manifest '{}' holds no annotations", cli_cfg.manifest);
        }

        // ── Step 2: Vocabulary ────────────────────────────────────────────────
        let vocab = VocabularyStore::new(&cli_cfg.checkpoint_dir)
            .load_or_build(&dataset.all_texts(), cli_cfg.vocab_size)?;

        // ── Step 3: Architecture ──────────────────────────────────────────────
        // A resumed run must rebuild exactly the saved architecture and
        // keep sampling examples the way the saved run did.
        let ckpt = CheckpointManager::new(&cli_cfg.checkpoint_dir)?;
        let (cfg, model_cfg) = if ckpt.has_checkpoint() {
            tracing::info!("Resuming from '{}'", cli_cfg.checkpoint_dir);
            let cfg = cli_cfg.resumed_from(&ckpt.load_train_config()?);
            let model_cfg = ckpt.load_model_config()?;
            model_cfg.validate(cfg.image_size)?;
            (cfg, model_cfg)
        } else {
            let model_cfg = cli_cfg.model_config(vocab.vocabulary_size())?;
            ckpt.save_model_config(&model_cfg)?;
            (cli_cfg.clone(), model_cfg)
        };
        ckpt.save_train_config(&cfg)?;

        // ── Step 4: Examples ──────────────────────────────────────────────────
        let mut example_cfg = cfg.example_config();
        example_cfg.max_words = model_cfg.max_words;
        example_cfg.local_mode = model_cfg.local_context;
        let builder = ExampleBuilder::new(vocab, example_cfg);

        // ── Step 5: Training rounds ───────────────────────────────────────────
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
        let last = run_training(&cfg, &model_cfg, &dataset, &builder, &ckpt, &metrics)?;
        tracing::info!("Stopped after round {}", last);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_a_valid_model_config() {
        let cfg = TrainConfig::default();
        let model_cfg = cfg.model_config(500).unwrap();
        assert_eq!(model_cfg.vocab_size, 500);
        assert_eq!(model_cfg.max_words, 12);
        assert_eq!(model_cfg.backbone.trainable_tail, 2);

        let gather = TrainConfig {
            local_context: LocalContextMode::Gather,
            ..TrainConfig::default()
        };
        assert!(gather.model_config(500).is_ok());
    }

    #[test]
    fn test_unusable_settings_are_rejected() {
        let empty_window = TrainConfig {
            max_words: 0,
            ..TrainConfig::default()
        };
        assert!(empty_window.model_config(500).is_err());

        let uneven_grid = TrainConfig {
            local_context: LocalContextMode::Gather,
            image_size: 200,
            ..TrainConfig::default()
        };
        assert!(uneven_grid.model_config(500).is_err());

        let shallow_backbone = TrainConfig {
            local_context: LocalContextMode::Gather,
            backbone_channels: vec![16, 32, 64],
            ..TrainConfig::default()
        };
        assert!(shallow_backbone.model_config(500).is_err());
    }

    #[test]
    fn test_resumed_stop_token_run_keeps_end_targets() {
        let saved = TrainConfig {
            termination: Termination::StopToken,
            max_words: 8,
            ..TrainConfig::default()
        };
        let cli = TrainConfig {
            lr: 5e-4,
            rounds: 3,
            ..TrainConfig::default()
        };

        let resumed = cli.resumed_from(&saved);
        assert_eq!(resumed.termination, Termination::StopToken);
        assert!(resumed.example_config().append_end);
        assert_eq!(resumed.max_words, 8);
        // the schedule still follows the command line
        assert_eq!(resumed.lr, 5e-4);
        assert_eq!(resumed.rounds, 3);
    }
}
