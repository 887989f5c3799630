//! Bounded producer/consumer batch pipeline.
//!
//! ```text
//!   SampleSource (Arc, shared)        BatchPlanner (Mutex, shared)
//!          │                                   │ next indices
//!          ▼                                   ▼
//!   [worker 0] [worker 1] ... [worker N-1]   fetch + decode + stack
//!          │           │               │
//!          └───────────┴───── bounded queue (capacity / batch_size slots)
//!                                      │
//!                                      ▼
//!                         next_batch(timeout) ── orchestrator thread
//!
//!   Coordinator (Arc): stop flag, first error, live workers, stop signal
//! ```
//!
//! Lifecycle: `start` → `next_batch`* → `stop` → `join`. `join` requests
//! stop itself, and `Drop` calls `join`, so a pipeline never outlives its
//! handle with threads still writing to the queue.

mod config;
mod coordinator;
mod planner;
mod worker;

pub use config::{EpochMode, PipelineConfig, Remainder};
pub use coordinator::Coordinator;

use crossbeam_channel::{bounded, select, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::domain::error::{PipelineError, WorkerFailure};
use crate::domain::sample::Batch;
use crate::domain::traits::SampleSource;
use planner::BatchPlanner;
use worker::Worker;

/// Result of one `next_batch` call that is not a failure.
#[derive(Debug)]
pub enum Fetch {
    Batch(Batch),
    /// One-shot source ran out and every queued batch was consumed
    Exhausted,
    /// Stop was requested
    Stopped,
    /// Nothing arrived within the timeout
    TimedOut,
}

enum Wake {
    Batch(Batch),
    Disconnected,
    Stop,
    Timeout,
}

pub struct BatchPipeline {
    config:      PipelineConfig,
    queue:       Receiver<Batch>,
    coordinator: Arc<Coordinator>,
    workers:     Mutex<Vec<thread::JoinHandle<()>>>,
}

impl BatchPipeline {
    /// Validate the configuration and spawn `num_workers` workers.
    pub fn start(
        source: Arc<dyn SampleSource>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate(source.len())?;

        let (queue_tx, queue_rx) = bounded(config.queue_slots());
        let planner     = Arc::new(Mutex::new(BatchPlanner::new(source.len(), &config)));
        let coordinator = Arc::new(Coordinator::new());

        let pipeline = Self {
            config: config.clone(),
            queue: queue_rx,
            coordinator: coordinator.clone(),
            workers: Mutex::new(Vec::with_capacity(config.num_workers)),
        };

        for id in 0..config.num_workers {
            let worker = Worker {
                id,
                source:      source.clone(),
                planner:     planner.clone(),
                queue:       queue_tx.clone(),
                coordinator: coordinator.clone(),
            };
            coordinator.worker_started();
            let spawned = thread::Builder::new()
                .name(format!("batch-worker-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => pipeline.lock_workers().push(handle),
                Err(source) => {
                    coordinator.worker_finished();
                    // `pipeline` drops here: stop + join the workers already running
                    return Err(PipelineError::Spawn { worker: id, source });
                }
            }
        }

        tracing::info!(
            "Batch pipeline started: {} workers, batch_size={}, queue={} batches, mode={:?}",
            config.num_workers,
            config.batch_size,
            config.queue_slots(),
            config.mode,
        );
        Ok(pipeline)
    }

    /// Wait for the next batch.
    ///
    /// `timeout = None` waits until a batch arrives, the pipeline stops or
    /// the source is exhausted. A recorded worker failure is returned as an
    /// error on every call after it happened.
    pub fn next_batch(&self, timeout: Option<Duration>) -> Result<Fetch, PipelineError> {
        if let Some(failure) = self.coordinator.error() {
            return Err(PipelineError::Worker(failure));
        }
        if self.coordinator.should_stop() {
            return Ok(Fetch::Stopped);
        }

        let stop = self.coordinator.stop_signal();
        let wake = match timeout {
            Some(timeout) => select! {
                recv(self.queue) -> msg => msg.map_or(Wake::Disconnected, Wake::Batch),
                recv(stop) -> _ => Wake::Stop,
                default(timeout) => Wake::Timeout,
            },
            None => select! {
                recv(self.queue) -> msg => msg.map_or(Wake::Disconnected, Wake::Batch),
                recv(stop) -> _ => Wake::Stop,
            },
        };

        match wake {
            Wake::Batch(batch) => Ok(Fetch::Batch(batch)),
            Wake::Timeout => Ok(Fetch::TimedOut),
            Wake::Disconnected | Wake::Stop => {
                // A failing worker drops its sender and requests stop, so
                // check for a failure before calling this a normal ending.
                if let Some(failure) = self.coordinator.error() {
                    Err(PipelineError::Worker(failure))
                } else if self.coordinator.should_stop() {
                    Ok(Fetch::Stopped)
                } else {
                    Ok(Fetch::Exhausted)
                }
            }
        }
    }

    /// Request shutdown. Idempotent; wakes blocked workers and consumers.
    pub fn stop(&self) {
        self.coordinator.request_stop();
    }

    /// Stop (if not already) and wait until every worker has terminated.
    /// Safe to call more than once.
    pub fn join(&self) {
        self.stop();

        let handles: Vec<_> = self.lock_workers().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        let count = handles.len();
        for (id, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                self.coordinator
                    .record_error(WorkerFailure::new(id, "worker thread panicked"));
            }
        }

        // Release the memory of batches nobody will consume
        let discarded = self.queue.try_iter().count();
        tracing::debug!("Joined {} pipeline workers ({} queued batches discarded)", count, discarded);
    }

    /// Workers that have not yet terminated
    pub fn live_workers(&self) -> usize {
        self.coordinator.live_workers()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<thread::JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BatchPipeline {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::InMemorySource;
    use crate::domain::sample::{ImageShape, Sample};
    use anyhow::{bail, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const WAIT: Option<Duration> = Some(Duration::from_secs(5));

    fn source(n: usize) -> Arc<dyn SampleSource> {
        let shape = ImageShape::new(1, 2, 2);
        let samples = (0..n).map(|i| Sample::new(vec![i as f32; 4], i % 3)).collect();
        Arc::new(InMemorySource::new(shape, samples))
    }

    /// Fails on the `fail_at`-th call to `get` (0-based).
    struct FailingSource {
        inner:   Arc<dyn SampleSource>,
        calls:   AtomicUsize,
        fail_at: usize,
        panic:   bool,
    }

    impl SampleSource for FailingSource {
        fn len(&self) -> usize { self.inner.len() }
        fn shape(&self) -> ImageShape { self.inner.shape() }
        fn get(&self, index: usize) -> Result<Sample> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                if self.panic {
                    panic!("decoder blew up");
                }
                bail!("corrupt image {index}");
            }
            self.inner.get(index)
        }
    }

    /// Blocks forever in `get` until the test ends (simulates a stalled disk).
    struct StalledSource;

    impl SampleSource for StalledSource {
        fn len(&self) -> usize { 4 }
        fn shape(&self) -> ImageShape { ImageShape::new(1, 1, 1) }
        fn get(&self, _index: usize) -> Result<Sample> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Sample::new(vec![0.0], 0))
        }
    }

    fn drain(pipeline: &BatchPipeline) -> (Vec<Batch>, Fetch) {
        let mut batches = Vec::new();
        loop {
            match pipeline.next_batch(WAIT).unwrap() {
                Fetch::Batch(b) => batches.push(b),
                other => return (batches, other),
            }
        }
    }

    #[test]
    fn test_start_rejects_bad_config() {
        assert!(matches!(
            BatchPipeline::start(source(10), PipelineConfig::new(0, 10)),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            BatchPipeline::start(source(10), PipelineConfig::new(8, 4)),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_every_batch_is_full() {
        for (batch_size, workers) in [(1, 1), (3, 2), (4, 4), (7, 3)] {
            let cfg = PipelineConfig::new(batch_size, batch_size * 2).with_workers(workers);
            let pipeline = BatchPipeline::start(source(10), cfg).unwrap();
            for _ in 0..20 {
                match pipeline.next_batch(WAIT).unwrap() {
                    Fetch::Batch(b) => {
                        assert_eq!(b.len(), batch_size);
                        assert_eq!(b.inputs.len(), batch_size * 4);
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            pipeline.join();
            assert_eq!(pipeline.live_workers(), 0);
        }
    }

    #[test]
    fn test_one_shot_exhausts_and_workers_exit() {
        let pipeline = BatchPipeline::start(source(10), PipelineConfig::one_shot(3, 6)).unwrap();
        let (batches, end) = drain(&pipeline);
        assert_eq!(batches.len(), 3); // 10 / 3, remainder dropped
        assert!(matches!(end, Fetch::Exhausted));
        pipeline.join();
        assert_eq!(pipeline.live_workers(), 0);
    }

    #[test]
    fn test_one_shot_single_worker_keeps_source_order() {
        let pipeline = BatchPipeline::start(source(6), PipelineConfig::one_shot(2, 2)).unwrap();
        let (batches, _) = drain(&pipeline);
        let firsts: Vec<f32> = batches.iter().map(|b| b.inputs[0]).collect();
        assert_eq!(firsts, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_one_shot_multi_worker_covers_each_sample_once() {
        let cfg = PipelineConfig::one_shot(2, 4).with_workers(3);
        let pipeline = BatchPipeline::start(source(12), cfg).unwrap();
        let (batches, end) = drain(&pipeline);
        assert!(matches!(end, Fetch::Exhausted));
        let mut seen: Vec<usize> = batches
            .iter()
            .flat_map(|b| b.inputs.chunks(4).map(|px| px[0] as usize))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_then_join_is_bounded_and_idempotent() {
        // Queue of one batch, two workers: both producers end up blocked on a full queue.
        let cfg = PipelineConfig::new(2, 2).with_workers(2);
        let pipeline = BatchPipeline::start(source(10), cfg).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        pipeline.stop();
        pipeline.join();
        pipeline.join();
        pipeline.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(pipeline.live_workers(), 0);
        assert!(matches!(pipeline.next_batch(WAIT).unwrap(), Fetch::Stopped));
    }

    #[test]
    fn test_join_without_explicit_stop_does_not_deadlock() {
        let pipeline = BatchPipeline::start(source(10), PipelineConfig::new(2, 2)).unwrap();
        pipeline.join();
        assert_eq!(pipeline.live_workers(), 0);
    }

    #[test]
    fn test_stop_wakes_blocked_consumer() {
        let pipeline = Arc::new(BatchPipeline::start(Arc::new(StalledSource), PipelineConfig::new(4, 4)).unwrap());
        let waiter = {
            let pipeline = pipeline.clone();
            std::thread::spawn(move || pipeline.next_batch(None))
        };
        std::thread::sleep(Duration::from_millis(20));
        pipeline.stop();
        let fetched = waiter.join().unwrap().unwrap();
        assert!(matches!(fetched, Fetch::Stopped | Fetch::Batch(_)));
        pipeline.join();
    }

    #[test]
    fn test_timeout_is_reported() {
        let pipeline = BatchPipeline::start(Arc::new(StalledSource), PipelineConfig::new(4, 4)).unwrap();
        let fetched = pipeline.next_batch(Some(Duration::from_millis(10))).unwrap();
        assert!(matches!(fetched, Fetch::TimedOut));
        pipeline.join();
    }

    #[test]
    fn test_worker_error_is_recorded_and_propagated() {
        let failing = Arc::new(FailingSource {
            inner:   source(10),
            calls:   AtomicUsize::new(0),
            fail_at: 4, // third batch of two
            panic:   false,
        });
        let pipeline = BatchPipeline::start(failing, PipelineConfig::new(2, 2)).unwrap();

        let mut delivered = 0;
        let err = loop {
            match pipeline.next_batch(WAIT) {
                Ok(Fetch::Batch(_)) => delivered += 1,
                Ok(other) => panic!("unexpected {other:?}"),
                Err(e) => break e,
            }
        };
        assert!(delivered <= 2);
        match err {
            PipelineError::Worker(f) => assert!(f.message.contains("corrupt image 4")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(pipeline.coordinator().should_stop());
        pipeline.join();
        assert_eq!(pipeline.live_workers(), 0);
    }

    #[test]
    fn test_worker_panic_becomes_failure() {
        let failing = Arc::new(FailingSource {
            inner:   source(10),
            calls:   AtomicUsize::new(0),
            fail_at: 0,
            panic:   true,
        });
        let pipeline = BatchPipeline::start(failing, PipelineConfig::new(2, 2)).unwrap();
        match pipeline.next_batch(WAIT) {
            Err(PipelineError::Worker(f)) => assert!(f.message.contains("decoder blew up")),
            other => panic!("unexpected {other:?}"),
        }
        pipeline.join();
        assert_eq!(pipeline.live_workers(), 0);
    }

    #[test]
    fn test_empty_one_shot_source_is_exhausted() {
        let pipeline = BatchPipeline::start(source(0), PipelineConfig::one_shot(2, 2)).unwrap();
        assert!(matches!(pipeline.next_batch(WAIT).unwrap(), Fetch::Exhausted));
    }
}
