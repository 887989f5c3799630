// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The orchestrator and the batch pipeline only ever talk to
// these three traits. Concrete implementations live in other
// layers:
//
//   SampleSource  ← data::dataset (in-memory, image folder),
//                   data::cifar (CIFAR-10 binary records)
//   Learner       ← ml::learner::BurnLearner (model + objective
//                   + optimizer step composed on a Burn backend)
//   MetricsSink   ← infra::metrics (CSV file, in-memory)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Object Oriented Patterns)

use anyhow::Result;

use crate::domain::metrics::{MetricsSample, StepMetrics};
use crate::domain::sample::{Batch, ImageShape, ParameterSet, Sample};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// A finite, random-access split of (input, label) pairs.
///
/// Random access is what makes a source restartable: the pipeline
/// re-walks indices 0..len for every epoch in cyclic mode and can
/// permute them when shuffling. `get` may do real work (file read,
/// image decode) and is called concurrently from worker threads.
pub trait SampleSource: Send + Sync {
    /// Number of samples in one epoch
    fn len(&self) -> usize;

    /// Shape every returned sample conforms to
    fn shape(&self) -> ImageShape;

    /// Fetch and decode the sample at `index` (0 ≤ index < len)
    fn get(&self, index: usize) -> Result<Sample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Learner ──────────────────────────────────────────────────────────────────
/// Model, objective and optimizer step composed into the four
/// operations the training orchestrator drives.
///
/// The orchestrator is the sole caller, from a single thread, so
/// implementations need no internal locking.
pub trait Learner {
    /// Forward pass, loss/accuracy, one parameter update.
    fn train_step(&mut self, batch: &Batch) -> Result<StepMetrics>;

    /// Forward pass and loss/accuracy only; parameters are untouched.
    fn evaluate(&mut self, batch: &Batch) -> Result<StepMetrics>;

    /// Snapshot of every trainable parameter.
    fn parameters(&self) -> Result<ParameterSet>;

    /// Replace every trainable parameter with a previous snapshot.
    fn load_parameters(&mut self, params: &ParameterSet) -> Result<()>;
}

// ─── MetricsSink ──────────────────────────────────────────────────────────────
/// Destination for metric records (log file, dashboard, memory).
/// Failures are reported but never stop a training run.
pub trait MetricsSink {
    fn record(&mut self, sample: &MetricsSample) -> Result<()>;
}
