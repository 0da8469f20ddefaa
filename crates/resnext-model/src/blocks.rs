//! ResNeXt block implementations.
//!
//! A residual unit fans its input out to two branches, the grouped bottleneck and the
//! shortcut, sums the branch outputs and applies ReLU. Units are chained into stages.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use resnext_extra_ops::{add, Identity, LambdaReduce};

use crate::error::ResNeXtResult;

pub(crate) fn kaiming_normal() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

/// Grouped bottleneck branch: 1x1 reduce, 3x3 grouped, 1x1 expand.
///
/// The stride sits on the grouped 3x3 convolution.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        self.bn3.forward(out)
    }

    /// Create a new Bottleneck.
    pub fn new(
        in_channels: usize,
        width: usize,
        out_channels: usize,
        stride: usize,
        cardinality: usize,
        device: &Device<B>,
    ) -> Self {
        // conv1x1
        let conv1 = Conv2dConfig::new([in_channels, width], [1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn1 = BatchNormConfig::new(width).init(device);

        // grouped conv3x3
        let conv2 = Conv2dConfig::new([width, width], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(cardinality)
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn2 = BatchNormConfig::new(width).init(device);

        // conv1x1
        let conv3 = Conv2dConfig::new([width, out_channels], [1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn3 = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            relu: Relu::new(),
        }
    }
}

/// Strided 1x1 convolution + batch norm matching the bottleneck's output shape.
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Projection<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }

    /// Create a new Projection.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming_normal())
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }
}

/// One residual unit: `relu(bottleneck(x) + shortcut(x))`.
///
/// The shortcut is a [`Projection`] when the unit changes resolution or channel count and
/// [`Identity`] otherwise. Identity units have no shortcut tensors in a checkpoint, so the
/// projection is stored as an `Option` that loads as `None` when its keys are absent.
#[derive(Module, Debug)]
pub struct ResidualUnit<B: Backend> {
    residual: Bottleneck<B>,
    shortcut: Option<Projection<B>>,
    relu: Relu,
}

impl<B: Backend> ResidualUnit<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> ResNeXtResult<Tensor<B, 4>> {
        let identity = Identity::new();
        let merge = LambdaReduce::new(add::<B, 4>);
        let out = merge.apply(
            input,
            &[
                &|x| self.residual.forward(x),
                &|x| match &self.shortcut {
                    Some(projection) => projection.forward(x),
                    None => identity.forward(x),
                },
            ],
        )?;

        Ok(self.relu.forward(out))
    }

    /// Create a new ResidualUnit.
    pub fn new(
        in_channels: usize,
        width: usize,
        out_channels: usize,
        stride: usize,
        cardinality: usize,
        device: &Device<B>,
    ) -> Self {
        let shortcut = (stride != 1 || in_channels != out_channels)
            .then(|| Projection::new(in_channels, out_channels, stride, device));

        Self {
            residual: Bottleneck::new(in_channels, width, out_channels, stride, cardinality, device),
            shortcut,
            relu: Relu::new(),
        }
    }

    /// Whether the shortcut is a strided 1x1 projection rather than the identity.
    pub const fn has_projection(&self) -> bool {
        self.shortcut.is_some()
    }
}

/// Sequence of residual units sharing one output width.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    units: Vec<ResidualUnit<B>>,
}

impl<B: Backend> Stage<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> ResNeXtResult<Tensor<B, 4>> {
        self.units
            .iter()
            .try_fold(input, |out, unit| unit.forward(out))
    }

    /// Create a new Stage. Only the first unit changes stride and channel count.
    pub fn new(
        num_units: usize,
        in_channels: usize,
        width: usize,
        out_channels: usize,
        stride: usize,
        cardinality: usize,
        device: &Device<B>,
    ) -> Self {
        let units = (0..num_units)
            .map(|u| {
                if u == 0 {
                    ResidualUnit::new(in_channels, width, out_channels, stride, cardinality, device)
                } else {
                    ResidualUnit::new(out_channels, width, out_channels, 1, cardinality, device)
                }
            })
            .collect();

        Self { units }
    }

    pub fn units(&self) -> &[ResidualUnit<B>] {
        &self.units
    }
}
