// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands, one per workflow:
//
//   train     fresh training (or --resume from the newest snapshot)
//   retrain   fine-tune a snapshot of another run into a new dir
//   evaluate  held-out precision of a snapshot
//
// clap's derive macros generate --help, error messages and the
// string → value conversions (via FromStr for our enums).
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::config::{DatasetKind, RunConfig};
use crate::domain::sample::StepOrLatest;
use crate::ml::backend::BackendKind;
use crate::ml::model::Architecture;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier from scratch (or resume)
    Train(TrainArgs),

    /// Fine-tune a trained snapshot into a new checkpoint directory
    Retrain(RetrainArgs),

    /// Measure held-out precision of a trained snapshot
    Evaluate(EvaluateArgs),
}

/// Settings shared by `train` and `retrain`.
#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// Directory to write checkpoints, train_config.json and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Dataset directory (class folders, or CIFAR-10 .bin files)
    #[arg(long, default_value = "data/train")]
    pub data_dir: String,

    /// Samples per batch
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Queue capacity in samples (whole batches: capacity / batch_size)
    #[arg(long, default_value_t = 256)]
    pub capacity: usize,

    /// Background batch workers
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 50)]
    pub log_every: u64,

    #[arg(long, default_value_t = 200)]
    pub validate_every: u64,

    #[arg(long, default_value_t = 2000)]
    pub checkpoint_every: u64,

    /// Keep only the newest N snapshots (0 keeps all)
    #[arg(long, default_value_t = 5)]
    pub keep_last: usize,

    /// Seconds to wait for a batch before retrying (0 waits forever)
    #[arg(long, default_value_t = 120)]
    pub batch_timeout_secs: u64,

    /// Compute backend: wgpu or ndarray
    #[arg(long, default_value = "wgpu")]
    pub backend: BackendKind,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// lenet5, alexnet or vgg16
    #[arg(long, default_value = "lenet5")]
    pub architecture: Architecture,

    /// cifar10 or image-folder
    #[arg(long, default_value = "image-folder")]
    pub dataset: DatasetKind,

    /// Images are resized to size × size (image-folder only)
    #[arg(long, default_value_t = 208)]
    pub image_size: usize,

    /// 1 (grayscale) or 3 (RGB)
    #[arg(long, default_value_t = 3)]
    pub channels: usize,

    /// Fraction of an image folder used for training; the rest validates
    #[arg(long, default_value_t = 0.8)]
    pub train_ratio: f64,

    /// Seed for the split and the per-epoch shuffles
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Total optimizer steps
    #[arg(long, default_value_t = 10_000)]
    pub steps: u64,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Channels of the first convolution
    #[arg(long, default_value_t = 16)]
    pub base_width: usize,

    /// Width of the hidden fully-connected layers
    #[arg(long)]
    pub hidden: Option<usize>,

    /// Continue from the newest snapshot in --checkpoint-dir if present
    #[arg(long)]
    pub resume: bool,

    /// Delete the snapshots and metrics already in --checkpoint-dir
    #[arg(long, conflicts_with = "resume")]
    pub overwrite: bool,
}

#[derive(Args, Debug)]
pub struct RetrainArgs {
    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Checkpoint directory of the run to fine-tune
    #[arg(long)]
    pub from: PathBuf,

    /// Snapshot of the base run: a step number or "latest"
    #[arg(long, default_value = "latest")]
    pub from_step: StepOrLatest,

    /// Steps to train beyond the base snapshot
    #[arg(long, default_value_t = 2000)]
    pub steps: u64,

    /// Delete the snapshots and metrics already in --checkpoint-dir
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Checkpoint directory of a trained run
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// A step number or "latest"
    #[arg(long, default_value = "latest")]
    pub step: StepOrLatest,

    /// Dataset directory (defaults to the one the run trained on)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Override the backend recorded in train_config.json
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Stop after this many batches
    #[arg(long)]
    pub max_batches: Option<usize>,
}

/// Schedule flags over a base config. The application layer never sees
/// clap types.
impl ScheduleArgs {
    fn apply(self, base: RunConfig) -> RunConfig {
        RunConfig {
            checkpoint_dir:     self.checkpoint_dir,
            data_dir:           self.data_dir,
            batch_size:         self.batch_size,
            capacity:           self.capacity,
            num_workers:        self.workers,
            lr:                 self.lr,
            log_every:          self.log_every,
            validate_every:     self.validate_every,
            checkpoint_every:   self.checkpoint_every,
            keep_last:          (self.keep_last > 0).then_some(self.keep_last),
            batch_timeout_secs: (self.batch_timeout_secs > 0).then_some(self.batch_timeout_secs),
            backend:            self.backend,
            ..base
        }
    }
}

impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        a.schedule.apply(RunConfig {
            architecture: a.architecture,
            dataset:      a.dataset,
            image_size:   a.image_size,
            channels:     a.channels,
            train_ratio:  a.train_ratio,
            seed:         a.seed,
            max_steps:    a.steps,
            dropout:      a.dropout,
            base_width:   a.base_width,
            hidden:       a.hidden,
            num_classes:  None,
            ..RunConfig::default()
        })
    }
}

impl From<ScheduleArgs> for RunConfig {
    fn from(s: ScheduleArgs) -> Self {
        s.apply(RunConfig::default())
    }
}
