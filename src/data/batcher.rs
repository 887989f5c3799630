// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Converts a domain Batch (flat CHW f32 pixels + usize labels)
// into tensors on a Burn device.
//
//   Batch.inputs  [N·C·H·W] ─ reshape ─▶ images  [N, C, H, W]
//   Batch.labels  [N]       ─ i64    ─▶ targets [N]  (Int)
//
// The pipeline already guarantees every batch is full and every
// sample matches the shape, so this is a copy and a reshape.
//
// Generic over the backend B so the same batcher serves the
// autodiff training model and the inner validation model.
//
// Reference: Burn Book §4 (Batcher)

use burn::{prelude::*, tensor::TensorData};

use crate::domain::sample::Batch;

// ─── ImageBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,

    /// Class indices, [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, batch: &Batch) -> ImageBatch<B> {
        let n     = batch.len();
        let shape = batch.shape;

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(
                batch.inputs.clone(),
                [n, shape.channels, shape.height, shape.width],
            ),
            &self.device,
        );

        let labels: Vec<i64> = batch.labels.iter().map(|&l| l as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [n]), &self.device);

        ImageBatch { images, targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::{ImageShape, Sample};
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes_and_values() {
        let shape = ImageShape::new(1, 2, 2);
        let batch = Batch::from_samples(
            shape,
            vec![Sample::new(vec![0.0, 0.1, 0.2, 0.3], 4), Sample::new(vec![1.0; 4], 7)],
        )
        .unwrap();

        let out = ImageBatcher::<NdArray<f32>>::new(Default::default()).batch(&batch);
        assert_eq!(out.images.dims(), [2, 1, 2, 2]);
        assert_eq!(out.targets.dims(), [2]);

        let targets: Vec<i64> = out.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![4, 7]);

        let pixels: Vec<f32> = out.images.into_data().to_vec().unwrap();
        assert_eq!(pixels[5], 1.0);
        assert!((pixels[1] - 0.1).abs() < 1e-6);
    }
}
