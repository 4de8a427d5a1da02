// ============================================================
// Layer 1 — CLI Command Definitions
// ============================================================
// Argument structs for each subcommand, plus the conversions
// into application-layer configs. The application layer never
// depends on clap.
//
// Reference: Rust Book §12 (Building a CLI Program)
//            clap derive documentation (ValueEnum, value_parser)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    caption_use_case::CaptionConfig, evaluate_use_case::EvaluateConfig,
    train_use_case::TrainConfig,
};
use crate::domain::{annotation::BoundingBox, features::LocalContextMode};
use crate::ml::decoder::Termination;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train (or resume training) on an annotation manifest
    Train(TrainArgs),

    /// Caption and score every annotation of a manifest
    Evaluate(EvaluateArgs),

    /// Caption one region of one image
    Caption(CaptionArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LocalContextArg {
    /// Crop the box and run the backbone on it separately
    DualCrop,
    /// Pick the backbone grid cell under the box centre
    Gather,
}

impl From<LocalContextArg> for LocalContextMode {
    fn from(a: LocalContextArg) -> Self {
        match a {
            LocalContextArg::DualCrop => LocalContextMode::DualCrop,
            LocalContextArg::Gather => LocalContextMode::Gather,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TerminationArg {
    /// Always emit exactly max-words tokens
    FixedLength,
    /// Stop at the end-of-caption token
    StopToken,
}

impl From<TerminationArg> for Termination {
    fn from(a: TerminationArg) -> Self {
        match a {
            TerminationArg::FixedLength => Termination::FixedLength,
            TerminationArg::StopToken => Termination::StopToken,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON manifest of annotations
    #[arg(long, default_value = "data/regions.json")]
    pub manifest: String,

    /// Where checkpoints, vocabulary and metrics are written
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 10_000)]
    pub vocab_size: usize,

    /// Length of the token window
    #[arg(long, default_value_t = 12)]
    pub max_words: usize,

    #[arg(long, default_value_t = 300)]
    pub wordvec_size: usize,

    #[arg(long, default_value_t = 1024)]
    pub gru_size: usize,

    #[arg(long, value_enum, default_value_t = LocalContextArg::DualCrop)]
    pub local_context: LocalContextArg,

    /// Zero language features at padded window positions
    #[arg(long)]
    pub mask_padding: bool,

    #[arg(long, value_enum, default_value_t = TerminationArg::FixedLength)]
    pub termination: TerminationArg,

    /// Number of trailing backbone blocks that are trained
    #[arg(long, default_value_t = 2)]
    pub trainable_tail: usize,

    /// Pretrained backbone record (CompactRecorder format)
    #[arg(long)]
    pub backbone_weights: Option<String>,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 4096)]
    pub samples_per_round: usize,

    /// Rounds to run; 0 trains until interrupted
    #[arg(long, default_value_t = 0)]
    pub rounds: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Annotations captioned after each round
    #[arg(long, default_value_t = 4)]
    pub demo_count: usize,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            manifest: a.manifest,
            checkpoint_dir: a.checkpoint_dir,
            vocab_size: a.vocab_size,
            max_words: a.max_words,
            wordvec_size: a.wordvec_size,
            gru_size: a.gru_size,
            local_context: a.local_context.into(),
            mask_padding: a.mask_padding,
            termination: a.termination.into(),
            trainable_tail: a.trainable_tail,
            backbone_weights: a.backbone_weights,
            batch_size: a.batch_size,
            samples_per_round: a.samples_per_round,
            rounds: a.rounds,
            lr: a.lr,
            seed: a.seed,
            demo_count: a.demo_count,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long, default_value = "data/regions.json")]
    pub manifest: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// 0 decodes greedily
    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,

    /// Defaults to the termination the model was trained with
    #[arg(long, value_enum)]
    pub termination: Option<TerminationArg>,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Stop after this many annotations
    #[arg(long)]
    pub limit: Option<usize>,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            manifest: a.manifest,
            checkpoint_dir: a.checkpoint_dir,
            temperature: a.temperature,
            termination: a.termination.map(Into::into),
            seed: a.seed,
            limit: a.limit,
        }
    }
}

#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image file (JPEG or PNG)
    #[arg(long)]
    pub image: String,

    /// Region as x0,x1,y0,y1 in pixels
    #[arg(long, value_parser = parse_bbox)]
    pub bbox: [f32; 4],

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,

    #[arg(long, value_enum)]
    pub termination: Option<TerminationArg>,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl From<CaptionArgs> for CaptionConfig {
    fn from(a: CaptionArgs) -> Self {
        CaptionConfig {
            checkpoint_dir: a.checkpoint_dir,
            image: a.image,
            bbox: BoundingBox::from(a.bbox),
            temperature: a.temperature,
            termination: a.termination.map(Into::into),
            seed: a.seed,
        }
    }
}

fn parse_bbox(s: &str) -> Result<[f32; 4], String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("'{v}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    <[f32; 4]>::try_from(values)
        .map_err(|v| format!("expected 4 values x0,x1,y0,y1, got {}", v.len()))
}
