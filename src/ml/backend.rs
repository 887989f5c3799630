// ============================================================
// Layer 5 — Backend + Architecture Dispatch
// ============================================================
// Turns runtime choices into concrete Burn types:
//
//   BackendKind   ──▶  Autodiff<Wgpu> | Autodiff<NdArray>
//   Architecture  ──▶  LeNet5<B> | AlexNet<B> | Vgg16<B>
//
// and hands the resulting BurnLearner to the caller as a
// `&mut dyn Learner`, so layers above never name a backend or
// a model type.
//
// Reference: Burn Book §2 (Backends)

use anyhow::{bail, Result};
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    module::AutodiffModule,
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::domain::traits::Learner;
use crate::ml::learner::BurnLearner;
use crate::ml::model::{AlexNet, Architecture, ClassifierConfig, ImageClassifier, LeNet5, Vgg16};

type WgpuTrain    = Autodiff<Wgpu>;
type NdArrayTrain = Autodiff<NdArray<f32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through wgpu (Vulkan / Metal / DX12)
    #[default]
    Wgpu,
    /// Pure-Rust CPU backend
    NdArray,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Wgpu    => "wgpu",
            BackendKind::NdArray => "ndarray",
        })
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" | "gpu"          => Ok(BackendKind::Wgpu),
            "ndarray" | "cpu"       => Ok(BackendKind::NdArray),
            other => Err(format!("unknown backend '{other}' (expected wgpu or ndarray)")),
        }
    }
}

/// Build a freshly initialised learner for `classifier` on `backend`
/// and run `f` with it.
pub fn with_learner<R>(
    backend:       BackendKind,
    classifier:    &ClassifierConfig,
    learning_rate: f64,
    f:             impl FnOnce(&mut dyn Learner) -> Result<R>,
) -> Result<R> {
    classifier.validate()?;
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        bail!("learning rate must be > 0, got {learning_rate}");
    }
    tracing::info!("Building {} on {} backend", classifier.architecture, backend);

    match backend {
        BackendKind::Wgpu    => dispatch::<WgpuTrain, R>(classifier, learning_rate, Default::default(), f),
        BackendKind::NdArray => dispatch::<NdArrayTrain, R>(classifier, learning_rate, Default::default(), f),
    }
}

fn dispatch<B: AutodiffBackend, R>(
    classifier:    &ClassifierConfig,
    learning_rate: f64,
    device:        B::Device,
    f:             impl FnOnce(&mut dyn Learner) -> Result<R>,
) -> Result<R> {
    match classifier.architecture {
        Architecture::LeNet5  => build::<B, LeNet5<B>, R>(classifier, learning_rate, device, f),
        Architecture::AlexNet => build::<B, AlexNet<B>, R>(classifier, learning_rate, device, f),
        Architecture::Vgg16   => build::<B, Vgg16<B>, R>(classifier, learning_rate, device, f),
    }
}

fn build<B, M, R>(
    classifier:    &ClassifierConfig,
    learning_rate: f64,
    device:        B::Device,
    f:             impl FnOnce(&mut dyn Learner) -> Result<R>,
) -> Result<R>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    let model = M::init(classifier, &device);
    let optim = AdamConfig::new().init::<B, M>();
    let mut learner = BurnLearner::new(model, optim, learning_rate, device);
    f(&mut learner)
}
