//! Classifier head: global pool, flatten, linear.

use burn::{
    module::Ignored,
    nn::{
        pool::{AdaptiveAvgPool2dConfig, AvgPool2dConfig},
        Linear, LinearConfig,
    },
    prelude::*,
};
use resnext_extra_ops::{ensure_batched, flatten_batch};

use crate::config::{GlobalPool, FIXED_POOL_SIZE};

/// Global pooling has no parameters, so only the selected mode is stored and the pooling
/// layer is built on each forward pass.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    global_pool: Ignored<GlobalPool>,
    fc: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(
        in_features: usize,
        num_classes: usize,
        global_pool: GlobalPool,
        device: &Device<B>,
    ) -> Self {
        Self {
            global_pool: Ignored(global_pool),
            fc: LinearConfig::new(in_features, num_classes).init(device),
        }
    }

    /// `[N, C, H, W]` feature map to `[N, num_classes]` logits.
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let pooled = match self.global_pool.0 {
            GlobalPool::Fixed => AvgPool2dConfig::new([FIXED_POOL_SIZE, FIXED_POOL_SIZE])
                .with_strides([1, 1])
                .init()
                .forward(features),
            GlobalPool::Adaptive => AdaptiveAvgPool2dConfig::new([1, 1]).init().forward(features),
        };
        self.fc.forward(flatten_batch(pooled))
    }

    /// Classify a single pooled feature vector of shape `[C]`, returning `[1, num_classes]`.
    pub fn forward_vector(&self, features: Tensor<B, 1>) -> Tensor<B, 2> {
        self.fc.forward(ensure_batched(features))
    }

    pub fn global_pool(&self) -> &GlobalPool {
        &self.global_pool.0
    }

    pub fn in_features(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }
}
