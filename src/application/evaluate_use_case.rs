// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Held-out precision of a trained run:
//
//   Step 1: Load train_config.json from the checkpoint dir
//   Step 2: Build the held-out source (CIFAR test batch, or the
//           image-folder validation split)
//   Step 3: Build the learner and restore the snapshot
//           (mandatory: a missing snapshot is an error)
//   Step 4: Stream a one-shot pipeline to exhaustion

use anyhow::{Context, Result};

use crate::application::config::RunConfig;
use crate::application::datasets::evaluation_data;
use crate::data::pipeline::BatchPipeline;
use crate::domain::sample::StepOrLatest;
use crate::infra::checkpoint::CheckpointStore;
use crate::ml::backend::{with_learner, BackendKind};
use crate::ml::evaluator::{EvaluationReport, Evaluator};

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    target:         StepOrLatest,
    data_dir:       Option<String>,
    backend:        Option<BackendKind>,
    max_batches:    Option<usize>,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: impl Into<String>, target: StepOrLatest) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            target,
            data_dir:       None,
            backend:        None,
            max_batches:    None,
        }
    }

    /// Evaluate on a different copy of the dataset than the one trained on.
    pub fn with_data_dir(mut self, dir: Option<String>) -> Self {
        self.data_dir = dir;
        self
    }

    pub fn with_backend(mut self, backend: Option<BackendKind>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_max_batches(mut self, max: Option<usize>) -> Self {
        self.max_batches = max;
        self
    }

    /// Returns the restored step and the evaluation report.
    pub fn execute(&self) -> Result<(u64, EvaluationReport)> {
        let store = CheckpointStore::open_existing(&self.checkpoint_dir)?;
        let mut cfg: RunConfig = store
            .load_config()
            .with_context(|| format!("'{}' has no usable run config", self.checkpoint_dir))?;
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(backend) = self.backend {
            cfg.backend = backend;
        }

        let (source, num_classes) = evaluation_data(&cfg)?;
        let (step, params)        = store.load(self.target)?;
        let classifier            = cfg.classifier(cfg.num_classes.unwrap_or(num_classes));

        let mut evaluator = Evaluator::new();
        if let Some(secs) = cfg.batch_timeout_secs {
            evaluator = evaluator.with_batch_timeout(std::time::Duration::from_secs(secs));
        }
        if let Some(max) = self.max_batches {
            evaluator = evaluator.with_max_batches(max);
        }

        let pipeline = BatchPipeline::start(source, cfg.evaluation_pipeline())?;
        let report = with_learner(cfg.backend, &classifier, cfg.lr, |learner| {
            learner
                .load_parameters(&params)
                .with_context(|| format!("Cannot restore step {step} into {}", classifier.architecture))?;
            Ok(evaluator.run(learner, &pipeline)?)
        })?;

        tracing::info!("Step {}: precision {:.4}", step, report.precision());
        Ok((step, report))
    }
}
