// ============================================================
// Layer 4 — Example Builder
// ============================================================
// Converts one annotation into one next-word training example.
//
//   Annotation (image bytes, box, reference texts)
//       │
//       ├── decode image, clamp box to the image
//       ├── global tensor: whole image resized
//       ├── local context: box crop resized, or the grid cell
//       │                  under the box centre (gather mode)
//       ├── context vector from the clamped box
//       │
//       └── pick one reference at random → normalise → tokenise
//               pick split index idx in [0, len)
//               window = tokens[..idx] (last max_words, left-padded)
//               target = tokens[idx]
//
// Sampling a random split turns every caption into many
// single-step classification problems: "given these words and
// this region, which word comes next?"
//
// Reference: rand crate documentation (SliceRandom, gen_range)

use rand::{seq::SliceRandom, Rng};

use crate::data::context::{context_vector, grid_cell};
use crate::data::image::ImageDecoder;
use crate::data::preprocessor::Preprocessor;
use crate::domain::annotation::{Annotation, BoundingBox};
use crate::domain::error::{CaptionError, CaptionResult};
use crate::domain::features::{
    ExampleInputs, LocalContext, LocalContextMode, TrainingExample, IMG_SIZE,
};
use crate::domain::traits::Vocabulary;
use crate::domain::window::TokenWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExampleConfig {
    pub max_words: usize,
    pub image_size: usize,
    pub local_mode: LocalContextMode,
    /// Append the end marker to every caption so the model learns
    /// when to stop (stop-token decoding).
    pub append_end: bool,
}

impl Default for ExampleConfig {
    fn default() -> Self {
        Self {
            max_words: 12,
            image_size: IMG_SIZE,
            local_mode: LocalContextMode::DualCrop,
            append_end: false,
        }
    }
}

pub struct ExampleBuilder<V: Vocabulary> {
    vocab: V,
    decoder: ImageDecoder,
    preprocessor: Preprocessor,
    config: ExampleConfig,
}

impl<V: Vocabulary> ExampleBuilder<V> {
    pub fn new(vocab: V, config: ExampleConfig) -> Self {
        Self {
            vocab,
            decoder: ImageDecoder::new(config.image_size),
            preprocessor: Preprocessor::new(),
            config,
        }
    }

    pub fn vocab(&self) -> &V {
        &self.vocab
    }

    /// Build one training example with a randomly chosen reference and split.
    pub fn build<R: Rng + ?Sized>(
        &self,
        annotation: &Annotation,
        rng: &mut R,
    ) -> CaptionResult<TrainingExample> {
        let text = annotation
            .reference_texts
            .choose(rng)
            .ok_or_else(|| CaptionError::InvalidAnnotation {
                key: annotation.key.clone(),
            })?;

        let mut tokens = self.vocab.tokenize(&self.preprocessor.clean(text))?;
        if tokens.is_empty() {
            return Err(CaptionError::InsufficientTokens { text: text.clone() });
        }
        if self.config.append_end {
            tokens.push(self.vocab.end_token());
        }

        let idx = rng.gen_range(0..tokens.len());
        let window = TokenWindow::from_prefix(&tokens[..idx], self.config.max_words);
        let target = tokens[idx];

        let mut inputs = self.inputs(&annotation.image_bytes, &annotation.bbox)?;
        inputs.window = window;

        tracing::trace!(
            key = %annotation.key,
            split = idx,
            target,
            "built example"
        );
        Ok(TrainingExample { inputs, target })
    }

    /// Visual and geometric inputs with an empty ("no words yet") window.
    /// Used directly for inference.
    pub fn inputs(&self, image_bytes: &[u8], bbox: &BoundingBox) -> CaptionResult<ExampleInputs> {
        let img = self.decoder.load(image_bytes)?;
        let (width, height) = (img.width(), img.height());
        let bbox = bbox.clamp_to(width, height)?;

        let (global, resized_box) = self.decoder.global(&img, &bbox);
        let local = match self.config.local_mode {
            LocalContextMode::DualCrop => LocalContext::Crop(self.decoder.crop(&img, &bbox)),
            LocalContextMode::Gather => {
                LocalContext::Grid(grid_cell(&resized_box, self.config.image_size))
            }
        };
        let context = context_vector(&bbox, width as f32, height as f32);

        Ok(ExampleInputs {
            global,
            local,
            window: TokenWindow::empty(self.config.max_words),
            context,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{solid_png, FixedVocab};
    use super::*;
    use crate::domain::window::PAD_TOKEN;
    use rand::{rngs::StdRng, SeedableRng};

    fn builder(mode: LocalContextMode, append_end: bool) -> ExampleBuilder<FixedVocab> {
        let vocab = FixedVocab::new(&["a", "red", "car", "on", "the", "left"]);
        let config = ExampleConfig {
            max_words: 4,
            image_size: 64,
            local_mode: mode,
            append_end,
        };
        ExampleBuilder::new(vocab, config)
    }

    fn annotation(texts: &[&str]) -> Annotation {
        Annotation::new(
            "k1",
            solid_png(200, 200),
            BoundingBox::new(50.0, 150.0, 50.0, 150.0),
            texts.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn test_empty_references_is_invalid_annotation() {
        let b = builder(LocalContextMode::DualCrop, false);
        let mut rng = StdRng::seed_from_u64(0);
        let err = b.build(&annotation(&[]), &mut rng).unwrap_err();
        assert!(matches!(err, CaptionError::InvalidAnnotation { .. }));
    }

    #[test]
    fn test_reference_without_words_is_insufficient_tokens() {
        let b = builder(LocalContextMode::DualCrop, false);
        let mut rng = StdRng::seed_from_u64(0);
        let err = b.build(&annotation(&["?!"]), &mut rng).unwrap_err();
        assert!(matches!(err, CaptionError::InsufficientTokens { .. }));
    }

    #[test]
    fn test_window_is_prefix_of_target() {
        let b = builder(LocalContextMode::DualCrop, false);
        let caption = b.vocab().tokenize("a red car on the left").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let ex = b.build(&annotation(&["A red car on the left."]), &mut rng).unwrap();
            assert_eq!(ex.inputs.window.len(), 4);
            let words = ex.inputs.window.words();
            let idx = caption.iter().position(|&t| t == ex.target).unwrap();
            let start = idx.saturating_sub(4);
            assert_eq!(words, caption[start..idx].to_vec());
        }
    }

    #[test]
    fn test_first_word_target_has_empty_window() {
        let b = builder(LocalContextMode::DualCrop, false);
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen_empty = false;
        for _ in 0..50 {
            let ex = b.build(&annotation(&["red car"]), &mut rng).unwrap();
            if ex.inputs.window.tokens().iter().all(|&t| t == PAD_TOKEN) {
                assert_eq!(ex.target, b.vocab().tokenize("red").unwrap()[0]);
                seen_empty = true;
            }
        }
        assert!(seen_empty);
    }

    #[test]
    fn test_unknown_words_never_reach_the_window() {
        let b = builder(LocalContextMode::DualCrop, false);
        let known = b.vocab().tokenize("a car").unwrap();
        assert_eq!(b.vocab().tokenize("a blue shiny car").unwrap(), known);

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let ex = b.build(&annotation(&["a blue shiny car"]), &mut rng).unwrap();
            let idx = known.iter().position(|&t| t == ex.target).unwrap();
            let expected = TokenWindow::from_prefix(&known[..idx], 4);
            assert_eq!(ex.inputs.window.tokens(), expected.tokens());
        }
    }

    #[test]
    fn test_reference_of_unknown_words_is_insufficient_tokens() {
        let b = builder(LocalContextMode::DualCrop, false);
        let mut rng = StdRng::seed_from_u64(0);
        let err = b.build(&annotation(&["blue shiny"]), &mut rng).unwrap_err();
        assert!(matches!(err, CaptionError::InsufficientTokens { .. }));
    }

    #[test]
    fn test_end_marker_can_be_a_target() {
        let b = builder(LocalContextMode::DualCrop, true);
        let mut rng = StdRng::seed_from_u64(11);
        let hit = (0..50).any(|_| b.build(&annotation(&["car"]), &mut rng).unwrap().target == 1);
        assert!(hit);
    }

    #[test]
    fn test_dual_crop_inputs() {
        let b = builder(LocalContextMode::DualCrop, false);
        let png = solid_png(200, 200);
        let inputs = b.inputs(&png, &BoundingBox::new(50.0, 150.0, 50.0, 150.0)).unwrap();
        assert_eq!(inputs.global.shape(), [3, 64, 64]);
        match &inputs.local {
            LocalContext::Crop(t) => assert_eq!(t.shape(), [3, 64, 64]),
            other => panic!("expected crop, got {other:?}"),
        }
        assert_eq!(inputs.context.values(), &[0.25, 0.25, 0.75, 0.75, 0.25]);
    }

    #[test]
    fn test_gather_inputs_use_resized_grid() {
        let b = builder(LocalContextMode::Gather, false);
        let png = solid_png(200, 100);
        // centre (150, 75) → resized (48, 48) in a 64px image → cell (1, 1)
        let inputs = b.inputs(&png, &BoundingBox::new(100.0, 200.0, 50.0, 100.0)).unwrap();
        assert_eq!(
            inputs.local,
            LocalContext::Grid(crate::domain::features::GridCell { row: 1, col: 1 })
        );
    }

    #[test]
    fn test_box_outside_image_is_rejected() {
        let b = builder(LocalContextMode::DualCrop, false);
        let png = solid_png(100, 100);
        let err = b.inputs(&png, &BoundingBox::new(120.0, 150.0, 0.0, 10.0)).unwrap_err();
        assert!(matches!(err, CaptionError::InvalidBox { .. }));
    }

    #[test]
    fn test_nan_box_is_rejected() {
        let b = builder(LocalContextMode::DualCrop, false);
        let png = solid_png(100, 100);
        let err = b.inputs(&png, &BoundingBox::new(f32::NAN, 10.0, 0.0, 10.0)).unwrap_err();
        assert!(matches!(err, CaptionError::InvalidBox { .. }));
    }

    #[test]
    fn test_overhanging_box_is_clamped() {
        let b = builder(LocalContextMode::DualCrop, false);
        let png = solid_png(100, 100);
        let inputs = b.inputs(&png, &BoundingBox::new(50.0, 150.0, -20.0, 100.0)).unwrap();
        assert!(inputs.context.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_seeded_builds_are_reproducible() {
        let b = builder(LocalContextMode::Gather, false);
        let ann = annotation(&["a red car", "the car on the left"]);
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..5)
                .map(|_| b.build(&ann, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }
}
