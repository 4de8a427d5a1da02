// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn code lives here, apart from the batcher that builds
// the model's input tensors.
//
//   backbone.rs   — convolutional feature extractor with a
//                   frozen stem and a trainable tail
//   model.rs      — visual + context + language fusion model
//   trainer.rs    — CaptionSession (fit step) and the round loop
//   inferencer.rs — NextWordModel adapter over a trained model
//   decoder.rs    — greedy / temperature-sampled word-by-word decoding

pub mod backbone;

pub mod model;

pub mod trainer;

pub mod inferencer;

/// Backend-independent; only talks to NextWordModel
pub mod decoder;
