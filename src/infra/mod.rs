// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything persisted in the checkpoint directory:
//
//   checkpoint.rs       — model weights (CompactRecorder), the
//                         latest-round pointer and both configs
//   vocabulary_store.rs — the word-level tokenizer.json
//   metrics.rs          — per-round training metrics CSV

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary building, saving and loading
pub mod vocabulary_store;

/// Training metrics CSV logger
pub mod metrics;
