// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing the captioning
// problem. No Burn types, no file I/O.
//
//   annotation.rs → annotated image regions and their boxes
//   window.rs     → the left-padded token window
//   features.rs   → per-example model inputs and targets
//   traits.rs     → dataset, vocabulary and model collaborators
//   error.rs      → CaptionError

pub mod annotation;
pub mod error;
pub mod features;
pub mod traits;
pub mod window;
