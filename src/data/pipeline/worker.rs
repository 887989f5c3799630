//! Background worker loop.
//!
//! Each worker repeats: take a plan → fetch/decode its samples → stack
//! them into a batch → enqueue. Enqueue blocks while the queue is full and
//! wakes immediately on stop. A failing or panicking fetch is recorded in
//! the coordinator (which also requests stop) and ends the worker.

use crossbeam_channel::{select, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};

use super::coordinator::Coordinator;
use super::planner::BatchPlanner;
use crate::domain::error::WorkerFailure;
use crate::domain::sample::Batch;
use crate::domain::traits::SampleSource;

pub(crate) struct Worker {
    pub(crate) id:          usize,
    pub(crate) source:      Arc<dyn SampleSource>,
    pub(crate) planner:     Arc<Mutex<BatchPlanner>>,
    pub(crate) queue:       Sender<Batch>,
    pub(crate) coordinator: Arc<Coordinator>,
}

/// Decrements the live-worker count however the worker exits.
struct LiveGuard<'a>(&'a Coordinator);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.worker_finished();
    }
}

impl Worker {
    pub(crate) fn run(self) {
        let _live = LiveGuard(&self.coordinator);
        let mut produced = 0usize;

        loop {
            if self.coordinator.should_stop() {
                break;
            }

            let plan = self
                .planner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .next_plan();
            let Some(indices) = plan else {
                tracing::debug!("Worker {}: source exhausted after {} batches", self.id, produced);
                break;
            };

            let batch = match self.assemble(&indices) {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    self.coordinator
                        .record_error(WorkerFailure::new(self.id, format!("{e:#}")));
                    break;
                }
            };

            select! {
                send(self.queue, batch) -> sent => {
                    if sent.is_err() {
                        // Consumer side is gone
                        break;
                    }
                    produced += 1;
                }
                recv(self.coordinator.stop_signal()) -> _ => break,
            }
        }

        tracing::debug!("Worker {} exiting", self.id);
    }

    /// Fetch and stack one planned batch. Ok(None) if stop arrived midway.
    fn assemble(&self, indices: &[usize]) -> Result<Option<Batch>> {
        let mut samples = Vec::with_capacity(indices.len());
        for &index in indices {
            if self.coordinator.should_stop() {
                return Ok(None);
            }
            let fetched = panic::catch_unwind(AssertUnwindSafe(|| self.source.get(index)))
                .map_err(|payload| anyhow!("panicked: {}", panic_message(&payload)))
                .and_then(|r| r)
                .with_context(|| format!("Failed to load sample {index}"))?;
            samples.push(fetched);
        }
        Batch::from_samples(self.source.shape(), samples)
            .map(Some)
            .ok_or_else(|| {
                anyhow!(
                    "Sample size does not match shape {:?} of the source",
                    self.source.shape()
                )
            })
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
