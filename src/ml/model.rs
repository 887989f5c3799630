// ============================================================
// Layer 5 — Image Classifiers
// ============================================================
// Three convolutional classifiers behind one interface:
//
//   LeNet5   conv5×5 → pool → conv5×5 → pool → fc → fc → fc
//   AlexNet  5 × conv3×3 (3 pools) → fc → fc → fc
//   Vgg16    13 × conv3×3 in 5 blocks (pool after each) → fc → fc → fc
//
// All convolutions keep the spatial size ("same" padding); only
// the 2×2 max pools halve it. An adaptive average pool before the
// first fully-connected layer fixes the feature-map size, so any
// input at least `min_side()` pixels on each side works with the
// same head.
//
// `ImageClassifier` is the only thing the learner sees: build
// from a config, forward images [N, C, H, W] → logits [N, classes].
//
// Reference: LeCun et al. (1998), Krizhevsky et al. (2012),
//            Simonyan & Zisserman (2014), Burn Book §3 (Modules)

use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::domain::sample::ImageShape;

// ─── Architecture ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    LeNet5,
    AlexNet,
    Vgg16,
}

impl Architecture {
    /// Smallest height/width that survives every pooling stage
    pub fn min_side(self) -> usize {
        match self {
            Architecture::LeNet5  => 4,
            Architecture::AlexNet => 8,
            Architecture::Vgg16   => 32,
        }
    }

    fn default_hidden(self) -> usize {
        match self {
            Architecture::LeNet5  => 384,
            Architecture::AlexNet => 1024,
            Architecture::Vgg16   => 4096,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::LeNet5  => "lenet5",
            Architecture::AlexNet => "alexnet",
            Architecture::Vgg16   => "vgg16",
        };
        f.write_str(name)
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "lenet5" | "lenet" => Ok(Architecture::LeNet5),
            "alexnet"          => Ok(Architecture::AlexNet),
            "vgg16" | "vgg"    => Ok(Architecture::Vgg16),
            other => Err(format!("unknown architecture '{other}' (lenet5, alexnet, vgg16)")),
        }
    }
}

// ─── ClassifierConfig ─────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub architecture: Architecture,
    pub num_classes:  usize,
    pub input:        ImageShape,
    #[config(default = 0.5)]
    pub dropout:      f64,
    /// Channels of the first convolution; later layers scale from it
    #[config(default = 64)]
    pub base_width:   usize,
    /// Width of the hidden fully-connected layers (None = architecture default)
    pub hidden:       Option<usize>,
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_classes < 2 {
            bail!("num_classes must be at least 2, got {}", self.num_classes);
        }
        if self.input.channels == 0 {
            bail!("input must have at least one channel");
        }
        let min = self.architecture.min_side();
        if self.input.height < min || self.input.width < min {
            bail!(
                "{} needs images of at least {min}×{min}, got {}×{}",
                self.architecture,
                self.input.height,
                self.input.width
            );
        }
        if self.base_width == 0 || self.hidden == Some(0) {
            bail!("layer widths must be > 0");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        Ok(())
    }

    fn hidden_width(&self) -> usize {
        self.hidden.unwrap_or_else(|| self.architecture.default_hidden())
    }
}

// ─── ImageClassifier ──────────────────────────────────────────────────────────
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// Build a freshly initialised network.
    fn init(config: &ClassifierConfig, device: &B::Device) -> Self
    where
        Self: Sized;

    /// images: [N, C, H, W] → logits: [N, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

fn conv<B: Backend>(channels: [usize; 2], kernel: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_padding(PaddingConfig2d::Same)
        .init(device)
}

fn halve() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

// ─── LeNet5 ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct LeNet5<B: Backend> {
    conv1:   Conv2d<B>,
    conv2:   Conv2d<B>,
    pool:    MaxPool2d,
    squeeze: AdaptiveAvgPool2d,
    fc3:     Linear<B>,
    fc4:     Linear<B>,
    fc5:     Linear<B>,
    dropout: Dropout,
}

const LENET_GRID: usize = 4;

impl<B: Backend> ImageClassifier<B> for LeNet5<B> {
    fn init(config: &ClassifierConfig, device: &B::Device) -> Self {
        let width  = config.base_width;
        let hidden = config.hidden_width();
        Self {
            conv1:   conv([config.input.channels, width], 5, device),
            conv2:   conv([width, width], 5, device),
            pool:    halve(),
            squeeze: AdaptiveAvgPool2dConfig::new([LENET_GRID, LENET_GRID]).init(),
            fc3:     LinearConfig::new(width * LENET_GRID * LENET_GRID, hidden).init(device),
            fc4:     LinearConfig::new(hidden, hidden / 2).init(device),
            fc5:     LinearConfig::new(hidden / 2, config.num_classes).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(relu(self.conv1.forward(images)));
        let x = self.pool.forward(relu(self.conv2.forward(x)));
        let x = self.squeeze.forward(x).flatten::<2>(1, 3);

        let x = self.dropout.forward(relu(self.fc3.forward(x)));
        let x = self.dropout.forward(relu(self.fc4.forward(x)));
        self.fc5.forward(x)
    }
}

// ─── AlexNet ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct AlexNet<B: Backend> {
    conv1:   Conv2d<B>,
    conv2:   Conv2d<B>,
    conv3:   Conv2d<B>,
    conv4:   Conv2d<B>,
    conv5:   Conv2d<B>,
    pool:    MaxPool2d,
    squeeze: AdaptiveAvgPool2d,
    fc6:     Linear<B>,
    fc7:     Linear<B>,
    fc8:     Linear<B>,
    dropout: Dropout,
}

const ALEXNET_GRID: usize = 2;

impl<B: Backend> ImageClassifier<B> for AlexNet<B> {
    fn init(config: &ClassifierConfig, device: &B::Device) -> Self {
        // base 64 → 64, 192, 384, 256, 256
        let w      = config.base_width;
        let hidden = config.hidden_width();
        Self {
            conv1:   conv([config.input.channels, w], 3, device),
            conv2:   conv([w, 3 * w], 3, device),
            conv3:   conv([3 * w, 6 * w], 3, device),
            conv4:   conv([6 * w, 4 * w], 3, device),
            conv5:   conv([4 * w, 4 * w], 3, device),
            pool:    halve(),
            squeeze: AdaptiveAvgPool2dConfig::new([ALEXNET_GRID, ALEXNET_GRID]).init(),
            fc6:     LinearConfig::new(4 * w * ALEXNET_GRID * ALEXNET_GRID, hidden).init(device),
            fc7:     LinearConfig::new(hidden, hidden).init(device),
            fc8:     LinearConfig::new(hidden, config.num_classes).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(relu(self.conv1.forward(images)));
        let x = self.pool.forward(relu(self.conv2.forward(x)));
        let x = relu(self.conv3.forward(x));
        let x = relu(self.conv4.forward(x));
        let x = self.pool.forward(relu(self.conv5.forward(x)));
        let x = self.squeeze.forward(x).flatten::<2>(1, 3);

        let x = self.dropout.forward(relu(self.fc6.forward(x)));
        let x = self.dropout.forward(relu(self.fc7.forward(x)));
        self.fc8.forward(x)
    }
}

// ─── Vgg16 ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool:  MaxPool2d,
}

impl<B: Backend> VggBlock<B> {
    fn new(in_channels: usize, out_channels: usize, depth: usize, device: &B::Device) -> Self {
        let convs = (0..depth)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                conv([input, out_channels], 3, device)
            })
            .collect();
        Self { convs, pool: halve() }
    }

    fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 4> {
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    blocks:  Vec<VggBlock<B>>,
    squeeze: AdaptiveAvgPool2d,
    fc6:     Linear<B>,
    fc7:     Linear<B>,
    fc8:     Linear<B>,
    dropout: Dropout,
}

/// (width multiplier, convolutions) per block
const VGG16_BLOCKS: [(usize, usize); 5] = [(1, 2), (2, 2), (4, 3), (8, 3), (8, 3)];

impl<B: Backend> ImageClassifier<B> for Vgg16<B> {
    fn init(config: &ClassifierConfig, device: &B::Device) -> Self {
        let w      = config.base_width;
        let hidden = config.hidden_width();

        let mut in_channels = config.input.channels;
        let blocks = VGG16_BLOCKS
            .iter()
            .map(|&(mult, depth)| {
                let block = VggBlock::new(in_channels, mult * w, depth, device);
                in_channels = mult * w;
                block
            })
            .collect();

        Self {
            blocks,
            squeeze: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc6:     LinearConfig::new(in_channels, hidden).init(device),
            fc7:     LinearConfig::new(hidden, hidden).init(device),
            fc8:     LinearConfig::new(hidden, config.num_classes).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.squeeze.forward(x).flatten::<2>(1, 3);

        let x = self.dropout.forward(relu(self.fc6.forward(x)));
        let x = self.dropout.forward(relu(self.fc7.forward(x)));
        self.fc8.forward(x)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn logits_shape<M: ImageClassifier<B>>(config: &ClassifierConfig, batch: usize) -> [usize; 2] {
        let device = Default::default();
        let model  = M::init(config, &device);
        let s      = config.input;
        let images = Tensor::<B, 4>::zeros([batch, s.channels, s.height, s.width], &device);
        model.forward(images).dims()
    }

    #[test]
    fn test_lenet5_logits_shape() {
        let cfg = ClassifierConfig::new(Architecture::LeNet5, 10, ImageShape::rgb(32, 32))
            .with_base_width(8)
            .with_hidden(Some(32));
        assert_eq!(logits_shape::<LeNet5<B>>(&cfg, 2), [2, 10]);
    }

    #[test]
    fn test_alexnet_handles_non_square_input() {
        let cfg = ClassifierConfig::new(Architecture::AlexNet, 6, ImageShape::rgb(12, 20))
            .with_base_width(4)
            .with_hidden(Some(16));
        assert_eq!(logits_shape::<AlexNet<B>>(&cfg, 3), [3, 6]);
    }

    #[test]
    fn test_vgg16_logits_shape() {
        let cfg = ClassifierConfig::new(Architecture::Vgg16, 5, ImageShape::new(1, 32, 32))
            .with_base_width(2)
            .with_hidden(Some(8));
        assert_eq!(logits_shape::<Vgg16<B>>(&cfg, 1), [1, 5]);
    }

    #[test]
    fn test_validate_rejects_small_inputs() {
        let cfg = ClassifierConfig::new(Architecture::Vgg16, 10, ImageShape::rgb(16, 16));
        assert!(cfg.validate().is_err());
        let cfg = ClassifierConfig::new(Architecture::LeNet5, 10, ImageShape::rgb(16, 16));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = ClassifierConfig::new(Architecture::LeNet5, 10, ImageShape::rgb(32, 32));
        assert!(base.clone().with_dropout(1.0).validate().is_err());
        assert!(base.clone().with_base_width(0).validate().is_err());
        assert!(ClassifierConfig::new(Architecture::LeNet5, 1, ImageShape::rgb(32, 32))
            .validate()
            .is_err());
    }

    #[test]
    fn test_architecture_names_round_trip() {
        for arch in [Architecture::LeNet5, Architecture::AlexNet, Architecture::Vgg16] {
            assert_eq!(arch.to_string().parse::<Architecture>().unwrap(), arch);
        }
        assert_eq!("VGG-16".parse::<Architecture>().unwrap(), Architecture::Vgg16);
        assert!("resnet".parse::<Architecture>().is_err());
    }
}
