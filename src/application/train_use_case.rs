// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate config / open checkpoint store  (Layer 6 - infra)
//   Step 2: Build train + validation sources         (Layer 4 - data)
//   Step 3: Save train_config.json                   (Layer 6 - infra)
//   Step 4: Start both batch pipelines               (Layer 4 - data)
//   Step 5: Build the learner for the backend        (Layer 5 - ml)
//   Step 6: Run the orchestrator                     (Layer 5 - ml)
//
// Fine-tuning (`retrain`) differs only before Step 1: the base
// run's config is loaded from its checkpoint directory, the
// chosen snapshot is copied into the new directory, and the run
// then restores it as a mandatory resume. The step counter keeps
// counting from the base snapshot.
//
// A fresh run never writes into a directory that already holds
// snapshots unless asked to overwrite; overwriting clears the
// snapshots and metrics.csv first.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use std::{fs, path::PathBuf};

use crate::application::config::RunConfig;
use crate::application::datasets::training_data;
use crate::data::pipeline::BatchPipeline;
use crate::domain::sample::StepOrLatest;
use crate::infra::{checkpoint::CheckpointStore, metrics::CsvMetricsSink};
use crate::ml::backend::with_learner;
use crate::ml::trainer::{Restore, RunReport, Trainer};

/// Where a fine-tune starts from.
#[derive(Debug, Clone)]
pub struct FineTune {
    pub base_dir:    PathBuf,
    pub base_step:   StepOrLatest,
    /// Steps to train beyond the base snapshot
    pub extra_steps: u64,
    /// Clear a populated target directory instead of refusing it
    pub overwrite:   bool,
}

pub struct TrainUseCase {
    config:    RunConfig,
    restore:   Restore,
    overwrite: bool,
}

impl TrainUseCase {
    /// Fresh training; with `resume` it continues from the newest
    /// snapshot in the checkpoint directory when one exists.
    pub fn new(config: RunConfig, resume: bool) -> Self {
        let restore = if resume {
            Restore::Optional(StepOrLatest::Latest)
        } else {
            Restore::Fresh
        };
        Self { config, restore, overwrite: false }
    }

    /// Let a fresh run clear an already populated checkpoint directory.
    /// Has no effect when resuming.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Fine-tune from a snapshot of another run into `config.checkpoint_dir`.
    ///
    /// Architecture, image shape, classes and the data split come from the
    /// base run's saved config; `overrides` supplies the new directory, the
    /// learning rate and the schedule.
    pub fn fine_tune(overrides: RunConfig, base: FineTune) -> Result<Self> {
        let base_store = CheckpointStore::open_existing(&base.base_dir)?;
        let base_cfg: RunConfig = base_store
            .load_config()
            .with_context(|| format!("'{}' has no usable run config", base.base_dir.display()))?;

        let (step, params) = base_store.load(base.base_step)?;
        tracing::info!("Fine-tuning from step {} of '{}'", step, base.base_dir.display());

        let config = RunConfig {
            checkpoint_dir:     overrides.checkpoint_dir,
            data_dir:           overrides.data_dir,
            lr:                 overrides.lr,
            batch_size:         overrides.batch_size,
            capacity:           overrides.capacity,
            num_workers:        overrides.num_workers,
            max_steps:          step + base.extra_steps,
            log_every:          overrides.log_every,
            validate_every:     overrides.validate_every,
            checkpoint_every:   overrides.checkpoint_every,
            keep_last:          overrides.keep_last,
            batch_timeout_secs: overrides.batch_timeout_secs,
            backend:            overrides.backend,
            ..base_cfg
        };

        // The orchestrator only restores from its own store
        let target = CheckpointStore::open(&config.checkpoint_dir)?;
        if base.overwrite {
            clear_run(&target)?;
        } else {
            refuse_populated(&target)?;
        }
        target.save(step, &params)?;

        Ok(Self {
            config,
            restore:   Restore::Required(StepOrLatest::Step(step)),
            overwrite: false,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the run end to end.
    pub fn execute(&self) -> Result<RunReport> {
        let cfg = &self.config;

        // ── Step 1: Validate + open store ─────────────────────────────────────
        cfg.validate()?;
        let mut store = CheckpointStore::open(&cfg.checkpoint_dir)?;
        if let Some(keep) = cfg.keep_last {
            store = store.with_keep_last(keep);
        }
        if self.restore == Restore::Fresh {
            if self.overwrite {
                clear_run(&store)?;
            } else {
                refuse_populated(&store)?;
            }
        }

        // ── Step 2: Sources ───────────────────────────────────────────────────
        let data = training_data(cfg)?;

        // ── Step 3: Save config so retrain/evaluate rebuild the same model ─────
        let saved = RunConfig { num_classes: Some(data.num_classes), ..cfg.clone() };
        store.save_config(&saved)?;
        let classifier = saved.classifier(data.num_classes);
        classifier.validate()?;

        // ── Step 4: Pipelines ─────────────────────────────────────────────────
        let train      = BatchPipeline::start(data.train, cfg.train_pipeline())?;
        let validation = BatchPipeline::start(data.validation, cfg.validation_pipeline())?;

        // ── Step 5 + 6: Learner + orchestrator ────────────────────────────────
        let sink    = CsvMetricsSink::new(&cfg.checkpoint_dir)?;
        tracing::info!("Logging metrics to '{}'", sink.csv_path().display());
        let mut trainer = Trainer::new(cfg.trainer(self.restore), store).with_sink(Box::new(sink));

        let report = with_learner(cfg.backend, &classifier, cfg.lr, |learner| {
            Ok(trainer.run(learner, &train, Some(&validation))?)
        })?;

        tracing::info!(
            "Run finished: {:?} at step {} ({} checkpoints written)",
            report.state,
            report.final_step,
            report.checkpoints.len()
        );
        Ok(report)
    }
}

fn refuse_populated(store: &CheckpointStore) -> Result<()> {
    if let Some(newest) = store.list()?.last() {
        bail!(
            "'{}' already holds snapshots up to step {}; resume it or pass --overwrite",
            store.dir().display(),
            newest.step
        );
    }
    Ok(())
}

/// Remove the snapshots and metrics of a previous run in the same directory.
fn clear_run(store: &CheckpointStore) -> Result<()> {
    let removed = store.clear()?;
    let csv = store.dir().join("metrics.csv");
    if csv.exists() {
        fs::remove_file(&csv).with_context(|| format!("Cannot remove '{}'", csv.display()))?;
    }
    if removed > 0 {
        tracing::warn!("Overwrote {} snapshot(s) in '{}'", removed, store.dir().display());
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::BackendKind;
    use crate::ml::model::Architecture;
    use crate::ml::trainer::TerminalState;
    use image::{Rgb, RgbImage};
    use std::{fs, path::Path};

    fn image_folder(root: &Path) {
        for (c, class) in ["a", "b"].iter().enumerate() {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..6u8 {
                RgbImage::from_pixel(8, 8, Rgb([c as u8 * 255, i * 10, 0]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
    }

    fn config(root: &Path, ckpt: &str) -> RunConfig {
        RunConfig {
            data_dir:           root.join("data").display().to_string(),
            checkpoint_dir:     root.join(ckpt).display().to_string(),
            image_size:         8,
            channels:           1,
            batch_size:         2,
            capacity:           4,
            num_workers:        2,
            architecture:       Architecture::LeNet5,
            backend:            BackendKind::NdArray,
            base_width:         2,
            hidden:             Some(8),
            lr:                 1e-3,
            max_steps:          4,
            log_every:          2,
            validate_every:     2,
            checkpoint_every:   2,
            keep_last:          None,
            batch_timeout_secs: Some(30),
            ..Default::default()
        }
    }

    #[test]
    fn test_train_writes_checkpoints_config_and_metrics() {
        let root = tempfile::tempdir().unwrap();
        image_folder(&root.path().join("data"));
        let cfg = config(root.path(), "run");

        let report = TrainUseCase::new(cfg.clone(), false).execute().unwrap();
        assert_eq!(report.state, TerminalState::Completed);
        assert_eq!(report.checkpoints, vec![2, 4]);

        let store = CheckpointStore::open(&cfg.checkpoint_dir).unwrap();
        let saved: RunConfig = store.load_config().unwrap();
        assert_eq!(saved.num_classes, Some(2));

        let csv = fs::read_to_string(Path::new(&cfg.checkpoint_dir).join("metrics.csv")).unwrap();
        assert!(csv.lines().any(|l| l.starts_with("4,validation,")));
    }

    #[test]
    fn test_fine_tune_continues_step_counter_in_new_dir() {
        let root = tempfile::tempdir().unwrap();
        image_folder(&root.path().join("data"));
        let base = config(root.path(), "base");
        TrainUseCase::new(base.clone(), false).execute().unwrap();

        let tuned = config(root.path(), "tuned");
        let use_case = TrainUseCase::fine_tune(
            tuned.clone(),
            FineTune {
                base_dir:    PathBuf::from(&base.checkpoint_dir),
                base_step:   StepOrLatest::Latest,
                extra_steps: 2,
                overwrite:   false,
            },
        )
        .unwrap();
        assert_eq!(use_case.config().max_steps, 6);

        let report = use_case.execute().unwrap();
        assert_eq!(report.restored_from, Some(4));
        assert_eq!(report.final_step, 6);

        let steps: Vec<u64> = CheckpointStore::open(&tuned.checkpoint_dir)
            .unwrap()
            .list()
            .unwrap()
            .iter()
            .map(|c| c.step)
            .collect();
        assert_eq!(steps, vec![4, 6]);
    }

    #[test]
    fn test_fine_tune_requires_base_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let base = FineTune {
            base_dir:    root.path().join("nothing"),
            base_step:   StepOrLatest::Latest,
            extra_steps: 1,
            overwrite:   false,
        };
        assert!(TrainUseCase::fine_tune(config(root.path(), "t"), base).is_err());
        assert!(!root.path().join("nothing").exists());
    }

    fn saved_steps(dir: &str) -> Vec<u64> {
        CheckpointStore::open(dir).unwrap().list().unwrap().iter().map(|c| c.step).collect()
    }

    #[test]
    fn test_fresh_train_refuses_populated_dir() {
        let root = tempfile::tempdir().unwrap();
        image_folder(&root.path().join("data"));
        let cfg = config(root.path(), "run");
        TrainUseCase::new(cfg.clone(), false).execute().unwrap();

        let shorter = RunConfig { max_steps: 2, lr: 0.5, ..cfg.clone() };
        let err = TrainUseCase::new(shorter, false).execute().unwrap_err();
        assert!(err.to_string().contains("--overwrite"));
        assert_eq!(saved_steps(&cfg.checkpoint_dir), vec![2, 4]);

        let kept: RunConfig = CheckpointStore::open(&cfg.checkpoint_dir).unwrap().load_config().unwrap();
        assert_eq!(kept.lr, cfg.lr);
    }

    #[test]
    fn test_overwrite_clears_previous_run() {
        let root = tempfile::tempdir().unwrap();
        image_folder(&root.path().join("data"));
        let cfg = config(root.path(), "run");
        TrainUseCase::new(cfg.clone(), false).execute().unwrap();

        let shorter = RunConfig { max_steps: 2, ..cfg.clone() };
        let report = TrainUseCase::new(shorter, false).with_overwrite(true).execute().unwrap();
        assert_eq!(report.checkpoints, vec![2]);
        assert_eq!(saved_steps(&cfg.checkpoint_dir), vec![2]);

        let csv = fs::read_to_string(Path::new(&cfg.checkpoint_dir).join("metrics.csv")).unwrap();
        assert!(!csv.lines().any(|l| l.starts_with("4,")));
    }

    #[test]
    fn test_fine_tune_refuses_populated_target() {
        let root = tempfile::tempdir().unwrap();
        image_folder(&root.path().join("data"));
        let base  = config(root.path(), "base");
        let other = config(root.path(), "other");
        TrainUseCase::new(base.clone(), false).execute().unwrap();
        TrainUseCase::new(RunConfig { max_steps: 2, ..other.clone() }, false).execute().unwrap();

        let from = FineTune {
            base_dir:    PathBuf::from(&base.checkpoint_dir),
            base_step:   StepOrLatest::Step(2),
            extra_steps: 2,
            overwrite:   false,
        };
        assert!(TrainUseCase::fine_tune(other.clone(), from.clone()).is_err());
        assert_eq!(saved_steps(&other.checkpoint_dir), vec![2]);

        let use_case = TrainUseCase::fine_tune(other.clone(), FineTune { overwrite: true, ..from }).unwrap();
        assert_eq!(use_case.config().max_steps, 4);
        assert_eq!(saved_steps(&other.checkpoint_dir), vec![2]);
    }
}
