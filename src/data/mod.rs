// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an annotation on disk to device tensors:
//
//   ManifestDataset    → annotations (image bytes, box, references)
//       │
//       ▼
//   ExampleBuilder     → ImageDecoder + context encoder + Preprocessor
//       │                + vocabulary → one TrainingExample
//       ▼
//   TrainingBatches    → fixed-size batches, drawn at random
//   ValidationExamples → one pass over every annotation
//       │
//       ▼
//   CaptionBatcher     → Burn tensors for the model

/// JSON manifest implementation of the annotation source
pub mod dataset;

/// Decode, crop, resize and normalise images
pub mod image;

/// Box → context vector and grid cell
pub mod context;

/// Caption text normalisation
pub mod preprocessor;

/// Annotation → training example / inference inputs
pub mod example;

/// Training batches and the validation sequence
pub mod generator;

/// Stacks examples into tensor batches
pub mod batcher;
