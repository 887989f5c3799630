// ============================================================
// Layer 5 — Held-out Evaluator
// ============================================================
// Streams a one-shot pipeline to exhaustion through
// Learner::evaluate (no parameter updates) and reports:
//
//   precision = correct / evaluated samples
//
// Padded batches (Remainder::Pad) count their repeated samples,
// so use Remainder::Drop when an exact count matters.

use anyhow::Context;
use std::time::Duration;

use crate::data::pipeline::{BatchPipeline, Fetch};
use crate::domain::error::TrainingError;
use crate::domain::traits::Learner;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationReport {
    pub batches:   usize,
    pub samples:   usize,
    pub correct:   usize,
    pub mean_loss: f64,
}

impl EvaluationReport {
    /// Fraction of correctly classified samples, in [0, 1].
    pub fn precision(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.correct as f64 / self.samples as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    batch_timeout: Option<Duration>,
    max_batches:   Option<usize>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    /// Stop after this many batches even if the source has more.
    pub fn with_max_batches(mut self, max: usize) -> Self {
        self.max_batches = Some(max);
        self
    }

    /// Evaluate every batch the pipeline yields. The pipeline is stopped
    /// and joined before returning, on success or failure.
    pub fn run<L: Learner + ?Sized>(
        &self,
        learner:  &mut L,
        pipeline: &BatchPipeline,
    ) -> Result<EvaluationReport, TrainingError> {
        let outcome = self.drain(learner, pipeline);
        pipeline.stop();
        pipeline.join();

        let report = outcome?;
        println!("precision = {:.2}%", report.precision() * 100.0);
        tracing::info!(
            "Evaluated {} samples in {} batches: precision {:.4}, mean loss {:.4}",
            report.samples,
            report.batches,
            report.precision(),
            report.mean_loss
        );
        Ok(report)
    }

    fn drain<L: Learner + ?Sized>(
        &self,
        learner:  &mut L,
        pipeline: &BatchPipeline,
    ) -> Result<EvaluationReport, TrainingError> {
        let mut report   = EvaluationReport { batches: 0, samples: 0, correct: 0, mean_loss: 0.0 };
        let mut loss_sum = 0.0;

        while self.max_batches.map_or(true, |max| report.batches < max) {
            let batch = match pipeline.next_batch(self.batch_timeout)? {
                Fetch::Batch(batch) => batch,
                Fetch::Exhausted | Fetch::Stopped => break,
                Fetch::TimedOut => {
                    return Err(TrainingError::Timeout {
                        retries: 0,
                        timeout: self.batch_timeout.unwrap_or_default(),
                    })
                }
            };

            let metrics = learner
                .evaluate(&batch)
                .with_context(|| format!("Evaluation of batch {} failed", report.batches + 1))
                .map_err(TrainingError::Compute)?;

            let n = batch.len();
            report.batches += 1;
            report.samples += n;
            report.correct += (metrics.accuracy * n as f64 / 100.0).round() as usize;
            loss_sum       += metrics.loss;
            tracing::debug!("Batch {}: loss {:.4}, accuracy {:.2}%", report.batches, metrics.loss, metrics.accuracy);
        }

        if report.batches > 0 {
            report.mean_loss = loss_sum / report.batches as f64;
        }
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::InMemorySource;
    use crate::data::pipeline::PipelineConfig;
    use crate::domain::metrics::StepMetrics;
    use crate::domain::sample::{Batch, ImageShape, ParameterSet, Sample};
    use anyhow::{bail, Result};
    use std::sync::Arc;

    /// Predicts class 0 for every sample.
    struct ZeroPredictor;

    impl Learner for ZeroPredictor {
        fn train_step(&mut self, _batch: &Batch) -> Result<StepMetrics> {
            bail!("evaluation must not train")
        }

        fn evaluate(&mut self, batch: &Batch) -> Result<StepMetrics> {
            let hits = batch.labels.iter().filter(|&&l| l == 0).count();
            Ok(StepMetrics::new(1.0, hits as f64 * 100.0 / batch.len() as f64))
        }

        fn parameters(&self) -> Result<ParameterSet> {
            Ok(ParameterSet::from_bytes(Vec::new()))
        }

        fn load_parameters(&mut self, _params: &ParameterSet) -> Result<()> {
            Ok(())
        }
    }

    fn pipeline(n: usize, batch_size: usize) -> BatchPipeline {
        // labels 0,1,0,1,…
        let samples = (0..n).map(|i| Sample::new(vec![0.0], i % 2)).collect();
        let source  = Arc::new(InMemorySource::new(ImageShape::new(1, 1, 1), samples));
        BatchPipeline::start(source, PipelineConfig::one_shot(batch_size, batch_size * 2)).unwrap()
    }

    #[test]
    fn test_streams_to_exhaustion() {
        let p = pipeline(12, 4);
        let report = Evaluator::new().run(&mut ZeroPredictor, &p).unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.samples, 12);
        assert_eq!(report.correct, 6);
        assert!((report.precision() - 0.5).abs() < 1e-9);
        assert!((report.mean_loss - 1.0).abs() < 1e-9);
        assert_eq!(p.live_workers(), 0);
    }

    #[test]
    fn test_partial_batch_dropped() {
        let report = Evaluator::new().run(&mut ZeroPredictor, &pipeline(10, 4)).unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.samples, 8);
    }

    #[test]
    fn test_max_batches_limits_run() {
        let p = pipeline(40, 4);
        let report = Evaluator::new().with_max_batches(2).run(&mut ZeroPredictor, &p).unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(p.live_workers(), 0);
    }

    #[test]
    fn test_empty_report_precision_is_zero() {
        let report = EvaluationReport { batches: 0, samples: 0, correct: 0, mean_loss: 0.0 };
        assert_eq!(report.precision(), 0.0);
    }
}
