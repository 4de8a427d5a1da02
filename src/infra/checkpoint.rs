// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Layout of a checkpoint directory:
//
//   checkpoints/
//     model_round_1.mpk.gz   ← weights after round 1
//     model_round_2.mpk.gz
//     ...
//     latest_round.json      ← number of the latest saved round
//     model_config.json      ← CaptionModelConfig (architecture)
//     train_config.json      ← TrainConfig the run was started with
//     tokenizer.json         ← vocabulary (see vocabulary_store.rs)
//     metrics.csv            ← one row per round (see metrics.rs)
//
// The architecture is saved separately because the weights can
// only be loaded into a model built with the same config.
//
// A missing checkpoint means "start fresh". A checkpoint that is
// present but unreadable is an error, never silently replaced.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{fs, path::PathBuf};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::{CaptionModel, CaptionModelConfig};

const LATEST: &str = "latest_round.json";
const MODEL_CONFIG: &str = "model_config.json";
const TRAIN_CONFIG: &str = "train_config.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// True once at least one round has been saved.
    pub fn has_checkpoint(&self) -> bool {
        self.dir.join(LATEST).exists()
    }

    /// Writes {dir}/model_round_{round}.mpk.gz and moves the latest pointer.
    pub fn save_model<B: Backend>(&self, model: &CaptionModel<B>, round: usize) -> Result<()> {
        // recorder adds the extension
        let path = self.dir.join(format!("model_round_{round}"));
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest = self.dir.join(LATEST);
        fs::write(&latest, serde_json::to_string(&round)?)
            .with_context(|| format!("Failed to write '{}'", latest.display()))?;

        tracing::debug!("Saved checkpoint: round {}", round);
        Ok(())
    }

    /// Load the latest weights into `model`, which must have been built
    /// from the saved model config.
    pub fn load_model<B: Backend>(
        &self,
        model: CaptionModel<B>,
        device: &B::Device,
    ) -> Result<CaptionModel<B>> {
        let round = self.latest_round()?;
        let path = self.dir.join(format!("model_round_{round}"));
        tracing::info!("Loading checkpoint from round {}", round);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Was it written by a different architecture?",
                    path.display()
                )
            })?;

        // Loading restores gradient tracking on every parameter.
        Ok(model.load_record(record).freeze_backbone())
    }

    pub fn latest_round(&self) -> Result<usize> {
        let path = self.dir.join(LATEST);
        let s = fs::read_to_string(&path).with_context(|| {
            format!("Cannot find '{}'. Have you run 'train' first?", path.display())
        })?;
        serde_json::from_str::<usize>(&s)
            .with_context(|| format!("Corrupt round pointer '{}'", path.display()))
    }

    pub fn save_model_config(&self, cfg: &CaptionModelConfig) -> Result<()> {
        let path = self.dir.join(MODEL_CONFIG);
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    pub fn load_model_config(&self) -> Result<CaptionModelConfig> {
        let path = self.dir.join(MODEL_CONFIG);
        CaptionModelConfig::load(&path).with_context(|| {
            format!(
                "Cannot read model config from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })
    }

    pub fn save_train_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_train_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(TRAIN_CONFIG);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::LocalContextMode;
    use crate::ml::model::tests::{backbone_blocks_with_grad, tiny_config, tiny_inputs};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_fresh_dir_has_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy()).unwrap();
        assert!(!ckpt.has_checkpoint());
        assert!(ckpt.latest_round().is_err());
    }

    #[test]
    fn test_save_then_load_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy()).unwrap();
        let device = Default::default();
        let cfg = tiny_config(LocalContextMode::Gather);

        let saved = cfg.init::<TestBackend>(&device);
        ckpt.save_model(&saved, 3).unwrap();
        ckpt.save_model_config(&cfg).unwrap();
        assert!(ckpt.has_checkpoint());
        assert_eq!(ckpt.latest_round().unwrap(), 3);

        let cfg = ckpt.load_model_config().unwrap();
        let fresh = cfg.init::<TestBackend>(&device);
        let loaded = ckpt.load_model(fresh, &device).unwrap();

        let expected: Vec<f32> = saved
            .forward(tiny_inputs(LocalContextMode::Gather, 1, &device))
            .into_data()
            .to_vec()
            .unwrap();
        let got: Vec<f32> = loaded
            .forward(tiny_inputs(LocalContextMode::Gather, 1, &device))
            .into_data()
            .to_vec()
            .unwrap();
        for (a, b) in expected.iter().zip(&got) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_loaded_model_keeps_backbone_stem_frozen() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy()).unwrap();
        let device = Default::default();
        // five backbone blocks, the default tail of two is trainable
        let cfg = tiny_config(LocalContextMode::DualCrop);

        ckpt.save_model(&cfg.init::<TestAutodiffBackend>(&device), 1)
            .unwrap();
        let loaded = ckpt
            .load_model(cfg.init::<TestAutodiffBackend>(&device), &device)
            .unwrap();
        assert_eq!(
            backbone_blocks_with_grad(&loaded, &device),
            vec![false, false, false, true, true]
        );
    }

    #[test]
    fn test_corrupt_round_pointer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy()).unwrap();
        fs::write(dir.path().join(LATEST), "not a number").unwrap();
        assert!(ckpt.has_checkpoint());
        assert!(ckpt.latest_round().is_err());
    }

    #[test]
    fn test_train_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy()).unwrap();
        let cfg = TrainConfig {
            batch_size: 7,
            ..TrainConfig::default()
        };
        ckpt.save_train_config(&cfg).unwrap();
        assert_eq!(ckpt.load_train_config().unwrap().batch_size, 7);
    }
}
