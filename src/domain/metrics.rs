// ============================================================
// Layer 3 — Metrics Sample Domain Type
// ============================================================
// One append-only record of (step, loss, accuracy, split).
// Records are created by the orchestrator and handed to a
// MetricsSink; nothing mutates them afterwards.
//
// Example (CSV rendering by infra::metrics):
//   step,split,loss,accuracy
//   50,train,1.734512,38.000000
//   200,validation,1.690221,41.000000

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which data split a metric was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train      => write!(f, "train"),
            Split::Validation => write!(f, "validation"),
        }
    }
}

/// Loss and accuracy of one forward pass over one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMetrics {
    pub loss: f64,

    /// Top-1 accuracy in percent, range [0, 100]
    pub accuracy: f64,
}

impl StepMetrics {
    pub fn new(loss: f64, accuracy: f64) -> Self {
        Self { loss, accuracy }
    }
}

/// A metric record tied to the step counter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub step:     u64,
    pub split:    Split,
    pub loss:     f64,
    pub accuracy: f64,
}

impl MetricsSample {
    pub fn new(step: u64, split: Split, metrics: StepMetrics) -> Self {
        Self {
            step,
            split,
            loss:     metrics.loss,
            accuracy: metrics.accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_display() {
        assert_eq!(Split::Train.to_string(), "train");
        assert_eq!(Split::Validation.to_string(), "validation");
    }

    #[test]
    fn test_sample_copies_metrics() {
        let s = MetricsSample::new(50, Split::Train, StepMetrics::new(1.5, 40.0));
        assert_eq!(s.step, 50);
        assert_eq!(s.loss, 1.5);
        assert_eq!(s.accuracy, 40.0);
    }
}
