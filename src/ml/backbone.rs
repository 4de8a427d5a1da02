// ============================================================
// Layer 5 — Convolutional Backbone
// ============================================================
// The visual feature extractor, treated as a pure function:
//
//   images [batch, 3, S, S]  →  FeatureMap [batch, C, S/32, S/32]
//
// Five stride-2 conv blocks give the 32x downsampling the gather
// mode relies on. Blocks are split into a frozen stem and a
// trainable tail of `trainable_tail` blocks. Freezing is a
// transfer-learning policy, configured here, not a property of
// the architecture.
//
// Pretrained weights are loaded from a CompactRecorder file when
// `pretrained` is set; otherwise the backbone starts random.

use anyhow::{Context, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::activation::relu,
};

/// Output of the backbone, kept as a named intermediate so callers
/// choose between global pooling and per-cell gathering.
pub struct FeatureMap<B: Backend> {
    /// [batch, channels, rows, cols]
    pub map: Tensor<B, 4>,
}

impl<B: Backend> FeatureMap<B> {
    /// Mean over the spatial grid → [batch, channels].
    pub fn pooled(&self) -> Tensor<B, 2> {
        let [batch, channels, _, _] = self.map.dims();
        self.map
            .clone()
            .mean_dim(3)
            .mean_dim(2)
            .reshape([batch, channels])
    }

    /// The feature vector of one grid cell per example → [batch, channels].
    /// `cells` holds flat `row * cols + col` indices, shape [batch].
    pub fn gather(&self, cells: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [batch, channels, rows, cols] = self.map.dims();
        let flat = self.map.clone().reshape([batch, channels, rows * cols]);
        let idx = cells.reshape([batch, 1, 1]).repeat_dim(1, channels);
        flat.gather(2, idx).reshape([batch, channels])
    }
}

/// The external feature-extractor contract.
pub trait FeatureExtractor<B: Backend> {
    fn extract(&self, images: Tensor<B, 4>) -> FeatureMap<B>;

    /// Channel count of the produced feature map.
    fn channels(&self) -> usize;
}

#[derive(Config, Debug)]
pub struct BackboneConfig {
    #[config(default = "vec![32, 64, 128, 256, 512]")]
    pub channels: Vec<usize>,
    /// Number of trailing blocks that receive gradient updates.
    #[config(default = 2)]
    pub trainable_tail: usize,
    /// CompactRecorder file with pretrained backbone weights.
    #[config(default = "None")]
    pub pretrained: Option<String>,
}

impl BackboneConfig {
    /// Total downsampling of the stack: each block halves both sides.
    pub fn downsampling(&self) -> usize {
        2usize.saturating_pow(self.channels.len() as u32)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        let mut in_ch = 3;
        let blocks = self
            .channels
            .iter()
            .map(|&out_ch| {
                let conv = Conv2dConfig::new([in_ch, out_ch], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device);
                in_ch = out_ch;
                ConvBlock { conv }
            })
            .collect();
        let frozen = self.channels.len().saturating_sub(self.trainable_tail);
        Backbone {
            blocks,
            frozen,
            out_channels: in_ch,
        }
        .freeze()
    }

    /// `init`, then overwrite the weights with the pretrained record.
    pub fn init_pretrained<B: Backend>(&self, device: &B::Device) -> Result<Backbone<B>> {
        let backbone = self.init(device);
        let Some(path) = &self.pretrained else {
            return Ok(backbone);
        };
        let record = CompactRecorder::new()
            .load(path.into(), device)
            .with_context(|| format!("Cannot load pretrained backbone '{path}'"))?;
        tracing::info!("Loaded pretrained backbone from '{}'", path);
        Ok(backbone.load_record(record).freeze())
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    /// Leading blocks excluded from training.
    frozen: usize,
    out_channels: usize,
}

impl<B: Backend> Backbone<B> {
    /// Stop gradient tracking on the frozen stem. Must be re-applied
    /// after loading a record, which restores tracked parameters.
    pub fn freeze(self) -> Self {
        let Self {
            blocks,
            frozen,
            out_channels,
        } = self;
        let blocks = blocks
            .into_iter()
            .enumerate()
            .map(|(i, b)| if i < frozen { b.no_grad() } else { b })
            .collect();
        Self {
            blocks,
            frozen,
            out_channels,
        }
    }

    pub fn frozen_blocks(&self) -> usize {
        self.frozen
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl<B: Backend> FeatureExtractor<B> for Backbone<B> {
    fn extract(&self, images: Tensor<B, 4>) -> FeatureMap<B> {
        let map = self.blocks.iter().fold(images, |x, block| block.forward(x));
        FeatureMap { map }
    }

    fn channels(&self) -> usize {
        self.out_channels
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        optim::GradientsParams,
        tensor::backend::AutodiffBackend,
    };

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    /// Runs one backward pass through `backbone` and reports, per block,
    /// whether its conv weight received a gradient.
    pub fn blocks_with_grad<B: AutodiffBackend>(
        backbone: &Backbone<B>,
        device: &B::Device,
    ) -> Vec<bool> {
        let images = Tensor::<B, 4>::ones([1, 3, 32, 32], device);
        let grads = backbone.extract(images).map.sum().backward();
        let grads = GradientsParams::from_grads(grads, backbone);
        backbone
            .blocks
            .iter()
            .map(|block| {
                grads
                    .get::<B::InnerBackend, 4>(block.conv.weight.id)
                    .is_some()
            })
            .collect()
    }

    fn small() -> BackboneConfig {
        BackboneConfig::new().with_channels(vec![2, 3, 4, 4, 5])
    }

    #[test]
    fn test_feature_map_is_downsampled_by_32() {
        let device = Default::default();
        let backbone = small().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let fmap = backbone.extract(images);
        assert_eq!(fmap.map.dims(), [2, 5, 2, 2]);
        assert_eq!(backbone.channels(), 5);
        assert_eq!(small().downsampling(), 32);
    }

    #[test]
    fn test_trainable_tail_sets_frozen_stem() {
        let device = Default::default();
        let backbone = small().with_trainable_tail(2).init::<TestBackend>(&device);
        assert_eq!(backbone.num_blocks(), 5);
        assert_eq!(backbone.frozen_blocks(), 3);
    }

    #[test]
    fn test_only_the_tail_receives_gradients() {
        let device = Default::default();
        let backbone = small()
            .with_trainable_tail(2)
            .init::<TestAutodiffBackend>(&device);
        assert_eq!(
            blocks_with_grad(&backbone, &device),
            vec![false, false, false, true, true]
        );
    }

    #[test]
    fn test_tail_covering_every_block_trains_everything() {
        let device = Default::default();
        let backbone = small()
            .with_trainable_tail(5)
            .init::<TestAutodiffBackend>(&device);
        assert_eq!(backbone.frozen_blocks(), 0);
        assert!(blocks_with_grad(&backbone, &device).into_iter().all(|g| g));
    }

    #[test]
    fn test_loading_a_record_keeps_the_stem_frozen() {
        let device = Default::default();
        let source = small().init::<TestAutodiffBackend>(&device);
        let target = small().init::<TestAutodiffBackend>(&device);
        let reloaded = target.load_record(source.into_record()).freeze();
        assert_eq!(
            blocks_with_grad(&reloaded, &device),
            vec![false, false, false, true, true]
        );
    }

    #[test]
    fn test_pool_and_gather() {
        let device = Default::default();
        // one example, one channel, 2x2 grid: [[1, 2], [3, 4]]
        let map = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device)
            .reshape([1, 1, 2, 2]);
        let fmap = FeatureMap { map };

        let pooled: Vec<f32> = fmap.pooled().into_data().to_vec().unwrap();
        assert_eq!(pooled, vec![2.5]);

        // row 1, col 0 → flat index 2 → value 3
        let cells = Tensor::<TestBackend, 1, Int>::from_ints([2], &device);
        let picked: Vec<f32> = fmap.gather(cells).into_data().to_vec().unwrap();
        assert_eq!(picked, vec![3.0]);
    }
}
