// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// Every setting of a training run, saved as train_config.json
// next to the checkpoints so `retrain` and `evaluate` rebuild
// the same architecture, image shape and data split.
//
// RunConfig is the single source for the lower-level configs:
//
//   RunConfig ──▶ ClassifierConfig   (ml::model)
//             ──▶ PipelineConfig ×2  (train, validation)
//             ──▶ TrainerConfig      (ml::trainer)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

use crate::data::pipeline::PipelineConfig;
use crate::domain::sample::ImageShape;
use crate::ml::backend::BackendKind;
use crate::ml::model::{Architecture, ClassifierConfig};
use crate::ml::trainer::{Restore, TrainerConfig};

/// Where samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetKind {
    /// CIFAR-10 binary batches (data_batch_N.bin, test_batch.bin)
    Cifar10,
    /// One sub-directory of images per class
    ImageFolder,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetKind::Cifar10     => "cifar10",
            DatasetKind::ImageFolder => "image-folder",
        })
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "cifar10" | "cifar-10"             => Ok(DatasetKind::Cifar10),
            "image-folder" | "folder" | "images" => Ok(DatasetKind::ImageFolder),
            other => Err(format!("unknown dataset '{other}' (expected cifar10 or image-folder)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    // Data
    pub dataset:          DatasetKind,
    pub data_dir:         String,
    pub checkpoint_dir:   String,
    pub image_size:       usize,
    pub channels:         usize,
    /// None = detected from the dataset
    pub num_classes:      Option<usize>,
    pub train_ratio:      f64,
    pub seed:             u64,

    // Pipeline
    pub batch_size:       usize,
    pub capacity:         usize,
    pub num_workers:      usize,

    // Model
    pub architecture:     Architecture,
    pub backend:          BackendKind,
    pub dropout:          f64,
    pub base_width:       usize,
    pub hidden:           Option<usize>,
    pub lr:               f64,

    // Schedule
    pub max_steps:        u64,
    pub log_every:        u64,
    pub validate_every:   u64,
    pub checkpoint_every: u64,
    pub keep_last:        Option<usize>,
    pub batch_timeout_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset:            DatasetKind::ImageFolder,
            data_dir:           "data/train".to_string(),
            checkpoint_dir:     "checkpoints".to_string(),
            image_size:         208,
            channels:           3,
            num_classes:        None,
            train_ratio:        0.8,
            seed:               42,
            batch_size:         16,
            capacity:           256,
            num_workers:        4,
            architecture:       Architecture::LeNet5,
            backend:            BackendKind::Wgpu,
            dropout:            0.5,
            base_width:         16,
            hidden:             None,
            lr:                 1e-4,
            max_steps:          10_000,
            log_every:          50,
            validate_every:     200,
            checkpoint_every:   2000,
            keep_last:          Some(5),
            batch_timeout_secs: Some(120),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            bail!("image_size must be > 0");
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            bail!("train_ratio must be in (0, 1), got {}", self.train_ratio);
        }
        if self.max_steps == 0 {
            bail!("max_steps must be > 0");
        }
        Ok(())
    }

    /// Image shape the model sees. CIFAR-10 is always 3×32×32.
    pub fn image_shape(&self) -> ImageShape {
        match self.dataset {
            DatasetKind::Cifar10     => ImageShape::rgb(32, 32),
            DatasetKind::ImageFolder => ImageShape::new(self.channels, self.image_size, self.image_size),
        }
    }

    pub fn classifier(&self, num_classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(self.architecture, num_classes, self.image_shape())
            .with_dropout(self.dropout)
            .with_base_width(self.base_width)
            .with_hidden(self.hidden)
    }

    pub fn train_pipeline(&self) -> PipelineConfig {
        PipelineConfig::new(self.batch_size, self.capacity)
            .with_workers(self.num_workers)
            .with_shuffle(self.seed)
    }

    /// Validation batches come from one worker; the split is usually small.
    pub fn validation_pipeline(&self) -> PipelineConfig {
        PipelineConfig::new(self.batch_size, self.capacity)
            .with_shuffle(self.seed.wrapping_add(1))
    }

    /// Held-out evaluation: every whole batch exactly once.
    pub fn evaluation_pipeline(&self) -> PipelineConfig {
        PipelineConfig::one_shot(self.batch_size, self.capacity).with_workers(self.num_workers)
    }

    pub fn trainer(&self, restore: Restore) -> TrainerConfig {
        let config = TrainerConfig::new(self.max_steps)
            .with_log_every(self.log_every)
            .with_validate_every(self.validate_every)
            .with_checkpoint_every(self.checkpoint_every)
            .with_restore(restore);
        match self.batch_timeout_secs {
            Some(secs) => config.with_batch_timeout(Duration::from_secs(secs), 3),
            None       => config,
        }
    }
}
