// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal each. No model
// math and no printing here; only workflow coordination.

/// Training, with resume from the latest checkpoint
pub mod train_use_case;

/// Caption and score a whole manifest
pub mod evaluate_use_case;

/// Caption one region of one image
pub mod caption_use_case;
