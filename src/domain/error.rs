// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Every failure the data pipeline and the decoder can report.
// Example-level errors (InvalidAnnotation, InsufficientTokens,
// InvalidBox, ImageDecode) cause the example to be skipped and
// logged. Model errors are fatal for the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptionError {
    /// The annotation carries no reference texts.
    #[error("annotation '{key}' has no reference texts")]
    InvalidAnnotation { key: String },

    /// The chosen reference tokenised to zero words.
    #[error("reference '{text}' produced no tokens")]
    InsufficientTokens { text: String },

    /// Box has no area left after clamping to the image.
    #[error("box ({x0}, {x1}, {y0}, {y1}) is empty inside a {width}x{height} image")]
    InvalidBox {
        x0: f32,
        x1: f32,
        y0: f32,
        y1: f32,
        width: u32,
        height: u32,
    },

    #[error("cannot read annotation data: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    /// The model could not produce a distribution (shape mismatch, bad input).
    #[error("model call failed: {0}")]
    Model(String),

    /// Every weight of a distribution was zero or not finite.
    #[error("cannot sample from an empty distribution over {len} tokens")]
    EmptyDistribution { len: usize },

    /// A batch could not be filled because every drawn annotation was rejected.
    #[error("no usable annotation after {attempts} attempts")]
    DatasetExhausted { attempts: usize },

    #[error("unknown annotation key '{0}'")]
    UnknownKey(String),
}

pub type CaptionResult<T> = Result<T, CaptionError>;
