// ============================================================
// Layer 5 — Training Orchestrator
// ============================================================
// Drives one training run over already-started batch pipelines:
//
//   INIT ──▶ RUNNING ──▶ COMPLETED   step reached max_steps
//                   ├──▶ STOPPED     source exhausted / stop requested
//                   └──▶ FAILED      worker, model or repeated
//                                    checkpoint/timeout failure
//
// Every step of RUNNING:
//   1. pull one train batch (Exhausted/Stopped end the loop)
//   2. train_step: loss, accuracy, one optimizer update; step += 1
//   3. step % log_every == 0            → train metrics
//   4. step % validate_every == 0 or last → one validation batch
//   5. step % checkpoint_every == 0 or last → checkpoint
//
// Whatever the terminal state, both pipelines are stopped and
// joined before `run` returns.
//
// Failure budgets:
//   - a timed-out batch is retried; more than `max_timeouts` in a
//     row fails the run
//   - a failed checkpoint save is logged and skipped; the run fails
//     once `max_checkpoint_failures` saves in a row have failed
//   - metrics sink failures are only logged
//
// The orchestrator is the only caller of the learner, so the step
// counter and parameters have a single writer.

use anyhow::Context;
use std::{fmt, time::Duration};

use crate::data::pipeline::{BatchPipeline, Fetch};
use crate::domain::error::TrainingError;
use crate::domain::metrics::{MetricsSample, Split, StepMetrics};
use crate::domain::sample::StepOrLatest;
use crate::domain::traits::{Learner, MetricsSink};
use crate::infra::checkpoint::CheckpointStore;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Where a run's parameters and step counter come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    /// Start from step 0 with freshly initialised parameters
    Fresh,
    /// Resume if the snapshot exists, otherwise start fresh
    Optional(StepOrLatest),
    /// The snapshot must exist (fine-tuning, evaluation)
    Required(StepOrLatest),
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Absolute step at which the run completes
    pub max_steps:               u64,
    pub log_every:               u64,
    pub validate_every:          u64,
    pub checkpoint_every:        u64,
    pub restore:                 Restore,
    /// None waits forever for the next batch
    pub batch_timeout:           Option<Duration>,
    /// Consecutive timeouts tolerated before the run fails
    pub max_timeouts:            usize,
    /// Consecutive failed checkpoint saves that fail the run (≥ 1)
    pub max_checkpoint_failures: usize,
}

impl TrainerConfig {
    pub fn new(max_steps: u64) -> Self {
        Self {
            max_steps,
            log_every:               50,
            validate_every:          200,
            checkpoint_every:        2000,
            restore:                 Restore::Fresh,
            batch_timeout:           None,
            max_timeouts:            3,
            max_checkpoint_failures: 3,
        }
    }

    pub fn with_log_every(mut self, every: u64) -> Self {
        self.log_every = every;
        self
    }

    pub fn with_validate_every(mut self, every: u64) -> Self {
        self.validate_every = every;
        self
    }

    pub fn with_checkpoint_every(mut self, every: u64) -> Self {
        self.checkpoint_every = every;
        self
    }

    pub fn with_restore(mut self, restore: Restore) -> Self {
        self.restore = restore;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration, max_timeouts: usize) -> Self {
        self.batch_timeout = Some(timeout);
        self.max_timeouts  = max_timeouts;
        self
    }

    pub fn with_max_checkpoint_failures(mut self, failures: usize) -> Self {
        self.max_checkpoint_failures = failures;
        self
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        let fail = |msg: &str| Err(TrainingError::Configuration(msg.to_string()));
        if self.log_every == 0 {
            return fail("log_every must be > 0");
        }
        if self.validate_every == 0 {
            return fail("validate_every must be > 0");
        }
        if self.checkpoint_every == 0 {
            return fail("checkpoint_every must be > 0");
        }
        if self.max_checkpoint_failures == 0 {
            return fail("max_checkpoint_failures must be > 0");
        }
        if self.batch_timeout == Some(Duration::ZERO) {
            return fail("batch_timeout must be > 0");
        }
        Ok(())
    }
}

// ─── Run state ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init      => "INIT",
            RunState::Running   => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Failed    => "FAILED",
            RunState::Stopped   => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Non-error end of a run. FAILED is the `Err` side of `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    Stopped,
}

impl From<TerminalState> for RunState {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Completed => RunState::Completed,
            TerminalState::Stopped   => RunState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub state:         TerminalState,
    pub final_step:    u64,
    /// Step the run resumed from, if a snapshot was restored
    pub restored_from: Option<u64>,
    /// Steps of every checkpoint published during this run
    pub checkpoints:   Vec<u64>,
    /// Every metrics record emitted during this run
    pub history:       Vec<MetricsSample>,
}

// ─── Trainer ──────────────────────────────────────────────────────────────────

pub struct Trainer {
    config: TrainerConfig,
    store:  CheckpointStore,
    sink:   Option<Box<dyn MetricsSink>>,
}

/// Mutable bookkeeping of one `run` call.
struct Progress {
    state:                RunState,
    step:                 u64,
    saved_step:           u64,
    restored_from:        Option<u64>,
    checkpoints:          Vec<u64>,
    history:              Vec<MetricsSample>,
    checkpoint_failures:  usize,
    timeouts:             usize,
}

impl Progress {
    fn new() -> Self {
        Self {
            state:               RunState::Init,
            step:                0,
            saved_step:          0,
            restored_from:       None,
            checkpoints:         Vec::new(),
            history:             Vec::new(),
            checkpoint_failures: 0,
            timeouts:            0,
        }
    }

    fn enter(&mut self, next: RunState) {
        tracing::info!("Run state: {} → {} (step {})", self.state, next, self.step);
        self.state = next;
    }
}

impl Trainer {
    pub fn new(config: TrainerConfig, store: CheckpointStore) -> Self {
        Self { config, store, sink: None }
    }

    pub fn with_sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run until COMPLETED, STOPPED or FAILED.
    ///
    /// `train` should be cyclic for long runs; a one-shot train pipeline
    /// that runs out before `max_steps` ends the run as STOPPED.
    /// Both pipelines are stopped and joined before this returns.
    pub fn run<L: Learner + ?Sized>(
        &mut self,
        learner:    &mut L,
        train:      &BatchPipeline,
        validation: Option<&BatchPipeline>,
    ) -> Result<RunReport, TrainingError> {
        let mut progress = Progress::new();

        let outcome = self
            .initialise(learner, &mut progress)
            .and_then(|()| {
                progress.enter(RunState::Running);
                self.drive(learner, train, validation, &mut progress)
            });

        // Guaranteed shutdown, in every terminal state
        train.stop();
        if let Some(v) = validation {
            v.stop();
        }
        train.join();
        if let Some(v) = validation {
            v.join();
        }
        tracing::debug!("Pipelines joined ({} train workers alive)", train.live_workers());

        match outcome {
            Ok(terminal) => {
                progress.enter(terminal.into());
                Ok(RunReport {
                    state:         terminal,
                    final_step:    progress.step,
                    restored_from: progress.restored_from,
                    checkpoints:   progress.checkpoints,
                    history:       progress.history,
                })
            }
            Err(e) => {
                progress.enter(RunState::Failed);
                tracing::error!("Training failed at step {}: {}", progress.step, e);
                Err(e)
            }
        }
    }

    // ─── INIT ─────────────────────────────────────────────────────────────────

    fn initialise<L: Learner + ?Sized>(
        &self,
        learner:  &mut L,
        progress: &mut Progress,
    ) -> Result<(), TrainingError> {
        self.config.validate()?;

        if let Err(e) = self.store.clean_stale_temp() {
            tracing::warn!("Cannot clean stale checkpoint temp dirs: {}", e);
        }

        let (target, required) = match self.config.restore {
            Restore::Fresh => {
                return match self.store.list() {
                    Ok(existing) if !existing.is_empty() => Err(TrainingError::Configuration(format!(
                        "'{}' already holds {} snapshot(s) up to step {}; resume, or clear it to start fresh",
                        self.store.dir().display(),
                        existing.len(),
                        existing.last().map(|c| c.step).unwrap_or(0),
                    ))),
                    Ok(_) => Ok(()),
                    Err(e) => {
                        tracing::warn!("Cannot list checkpoints: {}", e);
                        Ok(())
                    }
                };
            }
            Restore::Optional(target) => (target, false),
            Restore::Required(target) => (target, true),
        };

        let (step, params) = match self.store.load(target) {
            Ok(found) => found,
            Err(e) if e.is_not_found() && !required => {
                tracing::info!("No checkpoint {} in '{}'; starting fresh", target, self.store.dir().display());
                return Ok(());
            }
            Err(e) if e.is_not_found() => return Err(TrainingError::CheckpointNotFound(e)),
            Err(e) => return Err(TrainingError::Restore(e)),
        };

        learner
            .load_parameters(&params)
            .with_context(|| format!("Cannot restore parameters of step {step}"))
            .map_err(TrainingError::Compute)?;

        progress.step          = step;
        progress.saved_step    = step;
        progress.restored_from = Some(step);
        tracing::info!("Resumed from step {}", step);
        Ok(())
    }

    // ─── RUNNING ──────────────────────────────────────────────────────────────

    fn drive<L: Learner + ?Sized>(
        &mut self,
        learner:    &mut L,
        train:      &BatchPipeline,
        validation: Option<&BatchPipeline>,
        progress:   &mut Progress,
    ) -> Result<TerminalState, TrainingError> {
        let max_steps = self.config.max_steps;
        if progress.step >= max_steps {
            tracing::info!("Already at step {} (max_steps {}); nothing to do", progress.step, max_steps);
            return Ok(TerminalState::Completed);
        }

        while progress.step < max_steps {
            let batch = match train.next_batch(self.config.batch_timeout)? {
                Fetch::Batch(batch) => {
                    progress.timeouts = 0;
                    batch
                }
                Fetch::TimedOut => {
                    self.on_timeout(progress)?;
                    continue;
                }
                Fetch::Exhausted => {
                    tracing::info!("Training source exhausted at step {}", progress.step);
                    return self.finish_early(learner, progress);
                }
                Fetch::Stopped => {
                    tracing::info!("Stop requested at step {}", progress.step);
                    return self.finish_early(learner, progress);
                }
            };

            let metrics = learner
                .train_step(&batch)
                .with_context(|| format!("Training step {} failed", progress.step + 1))
                .map_err(TrainingError::Compute)?;
            progress.step += 1;
            let step = progress.step;
            let last = step == max_steps;

            if step % self.config.log_every == 0 {
                println!(
                    "Step {}, train loss = {:.2}, train accuracy = {:.2}%",
                    step, metrics.loss, metrics.accuracy
                );
                self.emit(progress, Split::Train, metrics);
            }

            if let Some(val) = validation {
                if step % self.config.validate_every == 0 || last {
                    self.validate(learner, val, progress)?;
                }
            }

            if step % self.config.checkpoint_every == 0 || last {
                self.checkpoint(learner, progress)?;
            }
        }

        Ok(TerminalState::Completed)
    }

    fn on_timeout(&self, progress: &mut Progress) -> Result<(), TrainingError> {
        progress.timeouts += 1;
        let timeout = self.config.batch_timeout.unwrap_or_default();
        tracing::warn!(
            "No training batch within {:?} ({} of {} retries used)",
            timeout,
            progress.timeouts,
            self.config.max_timeouts
        );
        if progress.timeouts > self.config.max_timeouts {
            return Err(TrainingError::Timeout { retries: self.config.max_timeouts, timeout });
        }
        Ok(())
    }

    /// STOPPED: keep the progress made since the last snapshot.
    fn finish_early<L: Learner + ?Sized>(
        &mut self,
        learner:  &mut L,
        progress: &mut Progress,
    ) -> Result<TerminalState, TrainingError> {
        if progress.step > progress.saved_step {
            self.checkpoint(learner, progress)?;
        }
        Ok(TerminalState::Stopped)
    }

    fn validate<L: Learner + ?Sized>(
        &mut self,
        learner:    &mut L,
        validation: &BatchPipeline,
        progress:   &mut Progress,
    ) -> Result<(), TrainingError> {
        let batch = match validation.next_batch(self.config.batch_timeout)? {
            Fetch::Batch(batch) => batch,
            other => {
                tracing::warn!("Skipping validation at step {}: {:?}", progress.step, other);
                return Ok(());
            }
        };

        let metrics = learner
            .evaluate(&batch)
            .with_context(|| format!("Validation at step {} failed", progress.step))
            .map_err(TrainingError::Compute)?;

        println!(
            "**  Step {}, val loss = {:.2}, val accuracy = {:.2}%  **",
            progress.step, metrics.loss, metrics.accuracy
        );
        self.emit(progress, Split::Validation, metrics);
        Ok(())
    }

    fn checkpoint<L: Learner + ?Sized>(
        &mut self,
        learner:  &mut L,
        progress: &mut Progress,
    ) -> Result<(), TrainingError> {
        let step = progress.step;
        if progress.checkpoints.last() == Some(&step) {
            return Ok(());
        }

        let params = learner
            .parameters()
            .with_context(|| format!("Cannot snapshot parameters at step {step}"))
            .map_err(TrainingError::Compute)?;

        match self.store.save(step, &params) {
            Ok(info) => {
                progress.checkpoint_failures = 0;
                progress.saved_step = step;
                progress.checkpoints.push(step);
                tracing::info!("Checkpoint saved at step {} → '{}'", step, info.path.display());
                Ok(())
            }
            Err(e) => {
                progress.checkpoint_failures += 1;
                tracing::warn!(
                    "Checkpoint at step {} failed ({} of {} allowed in a row): {}",
                    step,
                    progress.checkpoint_failures,
                    self.config.max_checkpoint_failures,
                    e
                );
                if progress.checkpoint_failures >= self.config.max_checkpoint_failures {
                    return Err(TrainingError::RepeatedCheckpointFailure {
                        failures: progress.checkpoint_failures,
                        source:   e,
                    });
                }
                Ok(())
            }
        }
    }

    fn emit(&mut self, progress: &mut Progress, split: Split, metrics: StepMetrics) {
        let sample = MetricsSample::new(progress.step, split, metrics);
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.record(&sample) {
                tracing::warn!("Metrics sink failed at step {}: {:#}", progress.step, e);
            }
        }
        progress.history.push(sample);
    }
}
