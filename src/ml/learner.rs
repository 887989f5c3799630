// ============================================================
// Layer 5 — Objective + Optimizer Step + Learner
// ============================================================
// Composes a classifier, the classification objective and an
// optimizer into the framework-free `Learner` the orchestrator
// drives:
//
//   train_step  forward (autodiff) → loss → backward → optim.step
//   evaluate    model.valid() → forward (inner backend) → loss
//   parameters  model record → BinBytesRecorder → ParameterSet
//
// Key Burn insight:
//   - Training uses B (Autodiff<…>) so gradients are tracked
//   - model.valid() returns the model on B::InnerBackend, with
//     dropout disabled, so evaluation never touches gradients
//   - argmax(1) returns [batch, 1]; flatten before .equal()
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Context, Result};
use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::{ImageBatch, ImageBatcher};
use crate::domain::metrics::StepMetrics;
use crate::domain::sample::{Batch, ParameterSet};
use crate::domain::traits::Learner;
use crate::ml::model::ImageClassifier;

type ParamRecorder = BinBytesRecorder<FullPrecisionSettings>;

// ─── ClassificationObjective ──────────────────────────────────────────────────
/// Mean softmax cross-entropy and top-1 accuracy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationObjective;

impl ClassificationObjective {
    pub fn loss<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, targets)
    }

    /// Percentage of rows whose highest logit is the target class, in [0, 100].
    pub fn accuracy<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
        let total = targets.dims()[0];
        if total == 0 {
            return 0.0;
        }
        let correct: i64 = logits
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        correct as f64 * 100.0 / total as f64
    }

    fn measure<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> (Tensor<B, 1>, f64) {
        let accuracy = self.accuracy(logits.clone(), targets.clone());
        (self.loss(logits, targets), accuracy)
    }
}

// ─── BurnLearner ──────────────────────────────────────────────────────────────
pub struct BurnLearner<B, M, O>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    model:         M,
    optim:         O,
    objective:     ClassificationObjective,
    learning_rate: f64,
    train_batcher: ImageBatcher<B>,
    eval_batcher:  ImageBatcher<B::InnerBackend>,
    device:        B::Device,
}

impl<B, M, O> BurnLearner<B, M, O>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    pub fn new(model: M, optim: O, learning_rate: f64, device: B::Device) -> Self {
        tracing::info!(
            "Learner ready: {} parameters, lr={}",
            model.num_params(),
            learning_rate
        );
        Self {
            model,
            optim,
            objective: ClassificationObjective,
            learning_rate,
            train_batcher: ImageBatcher::new(device.clone()),
            eval_batcher: ImageBatcher::new(device.clone()),
            device,
        }
    }
}

impl<B, M, O> Learner for BurnLearner<B, M, O>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    fn train_step(&mut self, batch: &Batch) -> Result<StepMetrics> {
        let ImageBatch { images, targets } = self.train_batcher.batch(batch);

        let logits           = self.model.forward(images);
        let (loss, accuracy) = self.objective.measure(logits, targets);
        let loss_value: f64  = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            bail!("Model diverged with loss = {loss_value}");
        }

        // Backward pass + optimizer update
        let grads  = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);

        Ok(StepMetrics::new(loss_value, accuracy))
    }

    fn evaluate(&mut self, batch: &Batch) -> Result<StepMetrics> {
        let ImageBatch { images, targets } = self.eval_batcher.batch(batch);

        let model            = self.model.valid();
        let logits           = model.forward(images);
        let (loss, accuracy) = self.objective.measure(logits, targets);

        Ok(StepMetrics::new(loss.into_scalar().elem::<f64>(), accuracy))
    }

    fn parameters(&self) -> Result<ParameterSet> {
        let recorder = ParamRecorder::default();
        let bytes = <ParamRecorder as Recorder<B>>::record(&recorder, self.model.clone().into_record(), ())
            .context("Failed to serialise model parameters")?;
        Ok(ParameterSet::from_bytes(bytes))
    }

    fn load_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        let recorder = ParamRecorder::default();
        let record: <M as Module<B>>::Record =
            <ParamRecorder as Recorder<B>>::load(&recorder, params.as_bytes().to_vec(), &self.device)
                .context("Parameter snapshot does not match this model")?;
        self.model = self.model.clone().load_record(record);
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::{ImageShape, Sample};
    use crate::ml::model::{Architecture, ClassifierConfig, LeNet5};
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn learner() -> impl Learner {
        let device = Default::default();
        let cfg = ClassifierConfig::new(Architecture::LeNet5, 3, ImageShape::new(1, 8, 8))
            .with_base_width(4)
            .with_hidden(Some(16))
            .with_dropout(0.0);
        let model = LeNet5::<TestBackend>::init(&cfg, &device);
        let optim = AdamConfig::new().init::<TestBackend, LeNet5<TestBackend>>();
        BurnLearner::new(model, optim, 1e-2, device)
    }

    fn batch() -> Batch {
        let shape   = ImageShape::new(1, 8, 8);
        let samples = (0..4)
            .map(|i| Sample::new(vec![i as f32 / 4.0; 64], i % 3))
            .collect();
        Batch::from_samples(shape, samples).unwrap()
    }

    #[test]
    fn test_objective_accuracy_percent() {
        let device  = Default::default();
        let logits  = Tensor::<NdArray<f32>, 2>::from_floats([[2.0, 0.0], [0.0, 1.0], [3.0, 1.0], [0.0, 5.0]], &device);
        let targets = Tensor::<NdArray<f32>, 1, Int>::from_ints([0, 1, 1, 0], &device);
        assert_eq!(ClassificationObjective.accuracy(logits, targets), 50.0);
    }

    #[test]
    fn test_objective_loss_is_positive() {
        let device  = Default::default();
        let logits  = Tensor::<NdArray<f32>, 2>::from_floats([[0.0, 0.0]], &device);
        let targets = Tensor::<NdArray<f32>, 1, Int>::from_ints([1], &device);
        let loss    = ClassificationObjective.loss(logits, targets).into_scalar().elem::<f64>();
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-4);
    }

    #[test]
    fn test_train_step_reduces_loss_on_repeated_batch() {
        let mut learner = learner();
        let batch = batch();
        let first = learner.train_step(&batch).unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = learner.train_step(&batch).unwrap();
        }
        assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
        assert!((0.0..=100.0).contains(&last.accuracy));
    }

    #[test]
    fn test_evaluate_does_not_change_parameters() {
        let mut learner = learner();
        let before = learner.parameters().unwrap();
        learner.evaluate(&batch()).unwrap();
        assert_eq!(learner.parameters().unwrap(), before);
    }

    #[test]
    fn test_parameters_round_trip() {
        let mut learner = learner();
        let snapshot = learner.parameters().unwrap();
        assert!(!snapshot.is_empty());

        learner.train_step(&batch()).unwrap();
        assert_ne!(learner.parameters().unwrap(), snapshot);

        learner.load_parameters(&snapshot).unwrap();
        assert_eq!(learner.parameters().unwrap(), snapshot);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut learner = learner();
        assert!(learner.load_parameters(&ParameterSet::from_bytes(vec![1, 2, 3])).is_err());
    }
}
