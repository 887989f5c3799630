// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// `clap` and hands off to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    — train a classifier (optionally resume)
//   2. `retrain`  — fine-tune another run's snapshot
//   3. `evaluate` — held-out precision of a snapshot
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, RetrainArgs, TrainArgs};

use crate::ml::trainer::{RunReport, TerminalState};

#[derive(Parser, Debug)]
#[command(
    name = "conv-trainer",
    version = "0.1.0",
    about = "Train, fine-tune and evaluate LeNet5 / AlexNet / VGG16 image classifiers."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case. Nothing is computed here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Retrain(args)  => run_retrain(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training {} on '{}'", args.architecture, args.schedule.data_dir);
    let (resume, overwrite) = (args.resume, args.overwrite);
    let report = TrainUseCase::new(args.into(), resume)
        .with_overwrite(overwrite)
        .execute()?;
    print_summary(&report);
    Ok(())
}

fn run_retrain(args: RetrainArgs) -> Result<()> {
    use crate::application::train_use_case::{FineTune, TrainUseCase};

    let base = FineTune {
        base_dir:    args.from,
        base_step:   args.from_step,
        extra_steps: args.steps,
        overwrite:   args.overwrite,
    };
    let report = TrainUseCase::fine_tune(args.schedule.into(), base)?.execute()?;
    print_summary(&report);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let (step, report) = EvaluateUseCase::new(args.checkpoint_dir, args.step)
        .with_data_dir(args.data_dir)
        .with_backend(args.backend)
        .with_max_batches(args.max_batches)
        .execute()?;

    println!(
        "Step {}: {} of {} correct over {} batches, mean loss = {:.4}",
        step, report.correct, report.samples, report.batches, report.mean_loss
    );
    Ok(())
}

fn print_summary(report: &RunReport) {
    let outcome = match report.state {
        TerminalState::Completed => "Training complete",
        TerminalState::Stopped   => "Training stopped early (data exhausted)",
    };
    match report.checkpoints.last() {
        Some(step) => println!("{outcome} at step {}. Last checkpoint: step {step}.", report.final_step),
        None       => println!("{outcome} at step {}. No checkpoint written.", report.final_step),
    }
}
