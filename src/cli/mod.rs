// ============================================================
// Layer 1   CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`     trains the matcher on labelled pairs
//   2. `predict`   scores a file of pairs with a checkpoint
//   3. `score`     scores one pair given on the command line
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, ScoreArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "dsmm",
    version = "0.1.0",
    about = "Train a deep semantic matching model on text pairs, then score new pairs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Score(args)   => run_score(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};

    tracing::info!("Starting training on pairs in: {}", args.train_file);

    let config   = TrainConfig::try_from(args)?;
    let ckpt_dir = config.checkpoint_dir.clone();
    let summary  = TrainUseCase::new(config).execute()?;

    println!(
        "Training complete. Best epoch {} (loss {:.4}), checkpoints in '{}'.",
        summary.best_epoch, summary.best_loss, ckpt_dir
    );
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.checkpoint_dir, args.threshold, args.calibration_factor)?;
    let outcome  = use_case.predict_file(&args.input_file, args.output_file.as_deref())?;

    // Scores go to stdout when no output file is given, so keep the summary off it
    eprintln!("Scored {} pairs.", outcome.scored);
    if let Some(report) = outcome.report {
        eprintln!("{report}");
    }
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.checkpoint_dir, args.threshold, args.calibration_factor)?;
    let score    = use_case.score_pair(&args.left, &args.right)?;

    println!(
        "probability={:.4} match={} (threshold {:.2})",
        score.probability,
        score.prediction,
        use_case.threshold()
    );
    Ok(())
}
