//! ResNeXt image classification on Burn.
//!
//! This crate ties the model, weight loading and preprocessing crates together into a
//! classification pipeline and picks the compute backend from cargo features.

pub mod backend;
pub mod classify;

pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};
pub use classify::{
    run_classification, ClassifyConfig, ImageClassification, LabeledPrediction, DEFAULT_TOP_K,
};
#[doc(inline)]
pub use resnext_extra_ops as extra_ops;
#[doc(inline)]
pub use resnext_model as model;
#[doc(inline)]
pub use resnext_util as util;
