//! Shared lifecycle state of one batch pipeline.
//!
//! The coordinator is created by `BatchPipeline::start` and handed to
//! every worker as an `Arc`. It holds:
//! - the stop flag (set once, never cleared)
//! - the first worker failure (first writer wins)
//! - the number of live workers
//! - a stop-signal channel: nothing is ever sent on it, its only sender
//!   is dropped on stop, which wakes every `select!` waiting on it
//!   (blocked producers and a blocked consumer alike).

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::error::WorkerFailure;

pub struct Coordinator {
    stop_requested: AtomicBool,
    first_error:    Mutex<Option<WorkerFailure>>,
    live_workers:   AtomicUsize,
    stop_tx:        Mutex<Option<Sender<()>>>,
    stop_rx:        Receiver<()>,
}

impl Coordinator {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded(0);
        Self {
            stop_requested: AtomicBool::new(false),
            first_error:    Mutex::new(None),
            live_workers:   AtomicUsize::new(0),
            stop_tx:        Mutex::new(Some(stop_tx)),
            stop_rx,
        }
    }

    /// Request every worker to stop. Idempotent.
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("Pipeline stop requested");
        }
        // Dropping the sender disconnects `stop_rx` and wakes all waiters.
        self.stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Record a worker failure and request stop.
    /// Returns true if this was the first failure recorded.
    pub fn record_error(&self, failure: WorkerFailure) -> bool {
        let first = {
            let mut slot = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                tracing::error!("Pipeline {}", failure);
                *slot = Some(failure);
                true
            } else {
                tracing::debug!("Ignoring later pipeline failure: {}", failure);
                false
            }
        };
        self.request_stop();
        first
    }

    /// The first recorded worker failure, if any
    pub fn error(&self) -> Option<WorkerFailure> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Receiver that becomes disconnected once stop is requested
    pub(crate) fn stop_signal(&self) -> &Receiver<()> {
        &self.stop_rx
    }

    pub(crate) fn worker_started(&self) {
        self.live_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_finished(&self) {
        self.live_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
