//! Configuration for the batch pipeline.
//!
//! ```ignore
//! let train = PipelineConfig::new(100, 2000).with_workers(4).with_shuffle(42);
//! let eval  = PipelineConfig::one_shot(128, 1024).with_remainder(Remainder::Pad);
//! ```
//!
//! `capacity` counts samples, like the queue capacity of the training
//! scripts; the bounded queue holds `capacity / batch_size` whole batches.

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

/// What a worker does when the source runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochMode {
    /// Restart the source for another epoch, forever (long training runs)
    Cycle,
    /// Stop after one pass and report exhaustion (held-out evaluation)
    OneShot,
}

/// What happens to the samples left over at the end of an epoch when
/// they do not fill a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Remainder {
    /// Complete the batch with the first samples of the next epoch (Cycle only)
    Carry,
    /// Discard the partial batch
    Drop,
    /// Complete the batch by repeating its own leading samples
    Pad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Samples per batch (> 0)
    pub batch_size: usize,
    /// Queue capacity in samples (≥ batch_size)
    pub capacity: usize,
    /// Background worker threads (> 0)
    pub num_workers: usize,
    pub mode: EpochMode,
    pub remainder: Remainder,
    /// Reshuffle sample order every epoch from `seed + epoch`
    pub shuffle_seed: Option<u64>,
}

impl PipelineConfig {
    /// Cyclic pipeline that carries epoch remainders over.
    pub fn new(batch_size: usize, capacity: usize) -> Self {
        Self {
            batch_size,
            capacity,
            num_workers:  1,
            mode:         EpochMode::Cycle,
            remainder:    Remainder::Carry,
            shuffle_seed: None,
        }
    }

    /// Single-pass pipeline that drops the final partial batch.
    pub fn one_shot(batch_size: usize, capacity: usize) -> Self {
        Self {
            mode:      EpochMode::OneShot,
            remainder: Remainder::Drop,
            ..Self::new(batch_size, capacity)
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_remainder(mut self, remainder: Remainder) -> Self {
        self.remainder = remainder;
        self
    }

    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Number of whole batches the bounded queue can hold
    pub fn queue_slots(&self) -> usize {
        (self.capacity / self.batch_size.max(1)).max(1)
    }

    /// Check the configuration against a source of `source_len` samples.
    pub fn validate(&self, source_len: usize) -> Result<(), PipelineError> {
        let fail = |msg: String| Err(PipelineError::Configuration(msg));

        if self.batch_size == 0 {
            return fail("batch_size must be > 0".into());
        }
        if self.capacity < self.batch_size {
            return fail(format!(
                "capacity ({}) must be at least batch_size ({})",
                self.capacity, self.batch_size
            ));
        }
        if self.num_workers == 0 {
            return fail("num_workers must be > 0".into());
        }
        if self.mode == EpochMode::OneShot && self.remainder == Remainder::Carry {
            return fail("remainder Carry needs a cyclic pipeline; use Drop or Pad".into());
        }
        if self.mode == EpochMode::Cycle {
            if source_len == 0 {
                return fail("a cyclic pipeline needs a non-empty source".into());
            }
            if self.remainder == Remainder::Drop && source_len < self.batch_size {
                return fail(format!(
                    "source has {} samples, fewer than one batch of {}; \
                     every epoch would be dropped",
                    source_len, self.batch_size
                ));
            }
        }
        Ok(())
    }
}
