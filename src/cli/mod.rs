// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and delegates to Layer 2.
//
// Three commands are supported:
//   1. `train`    — trains (or resumes) the captioning model
//   2. `evaluate` — captions and scores a whole manifest
//   3. `caption`  — captions one region of one image
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CaptionArgs, Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "region-captioner",
    version = "0.1.0",
    about = "Train a model that describes image regions, then caption and score regions with it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The CLI layer only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Caption(args) => run_caption(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on annotations in: {}", args.manifest);
    let checkpoint_dir = args.checkpoint_dir.clone();
    TrainUseCase::new(args.into()).execute()?;

    println!("Training finished. Checkpoints in '{checkpoint_dir}'.");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let summary = EvaluateUseCase::new(args.into()).execute()?;

    for (name, s) in summary.statistics() {
        println!("Score {name} statistics:");
        println!(
            "  nobs={} minmax=({:.4}, {:.4}) mean={:.4} variance={:.6}",
            s.count, s.min, s.max, s.mean, s.variance
        );
    }
    Ok(())
}

fn run_caption(args: CaptionArgs) -> Result<()> {
    use crate::application::caption_use_case::CaptionUseCase;

    let use_case = CaptionUseCase::new(args.into())?;
    let (caption, confidence) = use_case.execute()?;
    println!("{caption} ({confidence:.3})");
    Ok(())
}
