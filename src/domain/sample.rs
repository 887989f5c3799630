// ============================================================
// Layer 3 — Samples, Batches and Parameter Snapshots
// ============================================================
// A Sample is one decoded image plus its class label.
// A Batch is exactly `batch_size` samples laid out contiguously
// so it can be turned into a [N, C, H, W] tensor in one copy.
//
// Pixel layout is CHW (channel-major), values scaled to [0, 1]:
//
//   pixels = [ R(0,0) R(0,1) ... | G(0,0) ... | B(0,0) ... ]
//
// Reference: Rust Book §5 (Structs), §8 (Vectors)

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Fixed shape of every image flowing through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl ImageShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width }
    }

    /// RGB image of the given size
    pub fn rgb(height: usize, width: usize) -> Self {
        Self::new(3, height, width)
    }

    /// Number of f32 values in one image
    pub fn volume(&self) -> usize {
        self.channels * self.height * self.width
    }
}

/// One decoded (input, label) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// CHW pixels in [0, 1]; length == shape.volume()
    pub pixels: Vec<f32>,

    /// Class index in 0..num_classes
    pub label: usize,
}

impl Sample {
    pub fn new(pixels: Vec<f32>, label: usize) -> Self {
        Self { pixels, label }
    }
}

/// A fixed-size group of samples processed in one compute step.
///
/// Only `Batch::from_samples` builds one, and it refuses an empty
/// list or mismatched pixel lengths, so `inputs.len()` is always
/// `labels.len() * shape.volume()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub shape:  ImageShape,
    pub inputs: Vec<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    /// Stack samples into one contiguous batch.
    /// Returns None if `samples` is empty or any sample has the wrong size.
    pub fn from_samples(shape: ImageShape, samples: Vec<Sample>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let volume = shape.volume();
        let mut inputs = Vec::with_capacity(volume * samples.len());
        let mut labels = Vec::with_capacity(samples.len());
        for sample in samples {
            if sample.pixels.len() != volume {
                return None;
            }
            inputs.extend_from_slice(&sample.pixels);
            labels.push(sample.label);
        }
        Some(Self { shape, inputs, labels })
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Opaque snapshot of every trainable parameter of a model.
///
/// The orchestrator and checkpoint store never look inside; only
/// the learner that produced the bytes knows how to load them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    bytes: Vec<u8>,
}

impl ParameterSet {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Which snapshot to restore: an exact step or the newest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOrLatest {
    Step(u64),
    Latest,
}

impl fmt::Display for StepOrLatest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOrLatest::Step(step) => write!(f, "at step {step}"),
            StepOrLatest::Latest     => write!(f, "(latest)"),
        }
    }
}

impl FromStr for StepOrLatest {
    type Err = String;

    /// "latest" or a step number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(StepOrLatest::Latest);
        }
        s.parse()
            .map(StepOrLatest::Step)
            .map_err(|_| format!("expected a step number or 'latest', got '{s}'"))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f32, label: usize) -> Sample {
        Sample::new(vec![value; 12], label)
    }

    #[test]
    fn test_volume() {
        assert_eq!(ImageShape::rgb(2, 2).volume(), 12);
        assert_eq!(ImageShape::new(1, 28, 28).volume(), 784);
    }

    #[test]
    fn test_batch_stacks_samples_in_order() {
        let shape = ImageShape::rgb(2, 2);
        let batch = Batch::from_samples(shape, vec![sample(0.0, 3), sample(1.0, 7)]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.labels, vec![3, 7]);
        assert_eq!(batch.inputs.len(), 24);
        assert_eq!(batch.inputs[0], 0.0);
        assert_eq!(batch.inputs[12], 1.0);
    }

    #[test]
    fn test_batch_rejects_wrong_pixel_count() {
        let shape = ImageShape::rgb(2, 2);
        let bad = Sample::new(vec![0.0; 5], 0);
        assert!(Batch::from_samples(shape, vec![sample(0.0, 0), bad]).is_none());
    }

    #[test]
    fn test_step_or_latest_from_str() {
        assert_eq!("latest".parse::<StepOrLatest>().unwrap(), StepOrLatest::Latest);
        assert_eq!("2000".parse::<StepOrLatest>().unwrap(), StepOrLatest::Step(2000));
        assert!("-3".parse::<StepOrLatest>().is_err());
    }

    #[test]
    fn test_batch_rejects_empty() {
        assert!(Batch::from_samples(ImageShape::rgb(2, 2), Vec::new()).is_none());
    }
}
