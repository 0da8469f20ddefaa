//! # ResNeXt-Burn
//!
//! ResNeXt image classification networks built with the Burn deep learning framework.
//! The default configuration is ResNeXt-101 32x4d: a 7x7 stem, four stages of
//! `[3, 4, 23, 3]` grouped bottleneck units with 32 groups of width 4, and a 1000-way
//! linear classifier.
//!
//! ## Modules
//!
//! - `config`: architecture hyperparameters and named presets.
//! - `blocks`: grouped bottleneck, shortcut, residual unit and stage.
//! - `head`: global pooling and the linear classifier.
//! - `model`: the stem and the assembled network.
//! - `error`: the crate's error type.

mod blocks;
mod config;
mod error;
mod head;
mod model;

#[doc(inline)]
pub use blocks::{Bottleneck, Projection, ResidualUnit, Stage};
#[doc(inline)]
pub use config::{
    feature_size, GlobalPool, ResNeXtConfig, ResNeXtVariant, DEFAULT_IMAGE_SIZE, FIXED_POOL_SIZE,
    STAGE_OUT_CHANNELS,
};
#[doc(inline)]
pub use error::{ResNeXtError, ResNeXtResult};
#[doc(inline)]
pub use head::ClassifierHead;
#[doc(inline)]
pub use model::{ResNeXt, ResNeXtRecord, Stem};

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use crate::{GlobalPool, ResNeXtConfig};

    pub type TestBackend = NdArray<f32>;

    /// One unit per stage and narrow groups, small enough for quick CPU tests.
    pub fn tiny_config() -> ResNeXtConfig {
        ResNeXtConfig::new()
            .with_layers([1, 1, 1, 1])
            .with_cardinality(4)
            .with_num_classes(10)
            .with_global_pool(GlobalPool::Adaptive)
    }
}
