// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The collaborators the captioning core talks to:
//
//   AnnotationSource → where annotated regions come from
//   Vocabulary       → words ⇄ integer indices
//   NextWordModel    → inputs → distribution over the next word
//
// The decoder and the batch generator are written against these
// traits, so tests can drive them with small in-memory fakes.

use rand::Rng;

use crate::domain::annotation::Annotation;
use crate::domain::error::CaptionResult;
use crate::domain::features::ExampleInputs;

// ─── AnnotationSource ─────────────────────────────────────────────────────────
pub trait AnnotationSource {
    /// Every key, in dataset order.
    fn all_keys(&self) -> Vec<String>;

    fn annotation(&self, key: &str) -> CaptionResult<Annotation>;

    /// One annotation drawn uniformly at random (with replacement).
    fn random_annotation<R: Rng + ?Sized>(&self, rng: &mut R) -> CaptionResult<Annotation>;
}

// ─── Vocabulary ───────────────────────────────────────────────────────────────
/// Index 0 is reserved for padding and unknown words.
pub trait Vocabulary {
    fn tokenize(&self, text: &str) -> CaptionResult<Vec<u32>>;

    /// Turn indices back into text; pad and end markers are dropped.
    fn detokenize(&self, tokens: &[u32]) -> CaptionResult<String>;

    fn vocabulary_size(&self) -> usize;

    /// Index of the end-of-caption marker.
    fn end_token(&self) -> u32;
}

// ─── NextWordModel ────────────────────────────────────────────────────────────
pub trait NextWordModel {
    /// Probability distribution over the vocabulary for the word that
    /// follows `inputs.window`.
    fn predict(&self, inputs: &ExampleInputs) -> CaptionResult<Vec<f32>>;
}
