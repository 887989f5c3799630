// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Three families of typed errors, one per component:
//
//   PipelineError   — batch pipeline start-up and worker failures
//   CheckpointError — snapshot persistence and lookup
//   TrainingError   — everything that ends a run in FAILED
//
// Normal terminations (source exhausted, stop requested, a
// single timeout) are NOT errors; see data::pipeline::Fetch.
//
// Reference: Rust Book §9 (Error Handling), thiserror docs

use std::{fmt, io, path::PathBuf, time::Duration};
use thiserror::Error;

use crate::domain::sample::StepOrLatest;

/// First failure recorded by a background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker:  usize,
    pub message: String,
}

impl WorkerFailure {
    pub fn new(worker: usize, message: impl Into<String>) -> Self {
        Self { worker, message: message.into() }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {} failed: {}", self.worker, self.message)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    Configuration(String),

    #[error("pipeline {0}")]
    Worker(WorkerFailure),

    #[error("failed to spawn pipeline worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint {target} in '{}'", .dir.display())]
    NotFound { dir: PathBuf, target: StepOrLatest },

    #[error("checkpoint io error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checkpoint metadata error at '{}': {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt checkpoint at '{}': {msg}", .path.display())]
    Corrupt { path: PathBuf, msg: String },
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CheckpointError::Io { path: path.into(), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CheckpointError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training configuration: {0}")]
    Configuration(String),

    #[error("pipeline {0}")]
    Worker(WorkerFailure),

    #[error("failed to spawn pipeline worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("required checkpoint is missing: {0}")]
    CheckpointNotFound(#[source] CheckpointError),

    #[error("checkpoint restore failed: {0}")]
    Restore(#[source] CheckpointError),

    #[error("checkpoint saving failed {failures} times in a row: {source}")]
    RepeatedCheckpointFailure {
        failures: usize,
        #[source]
        source: CheckpointError,
    },

    #[error("no batch arrived within {timeout:?}, {retries} retries exhausted")]
    Timeout { retries: usize, timeout: Duration },

    /// Model, objective or optimizer failure; context names the step.
    #[error(transparent)]
    Compute(anyhow::Error),
}

impl From<PipelineError> for TrainingError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Configuration(msg)      => TrainingError::Configuration(msg),
            PipelineError::Worker(failure)         => TrainingError::Worker(failure),
            PipelineError::Spawn { worker, source } => TrainingError::Spawn { worker, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_failure_maps_to_training_error() {
        let err: TrainingError = PipelineError::Worker(WorkerFailure::new(2, "decode")).into();
        match err {
            TrainingError::Worker(f) => assert_eq!(f, WorkerFailure::new(2, "decode")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_not_found_message_names_target() {
        let err = CheckpointError::NotFound {
            dir:    PathBuf::from("ckpt"),
            target: StepOrLatest::Step(100),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no checkpoint at step 100 in 'ckpt'");
    }
}
