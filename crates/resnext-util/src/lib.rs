//! Utilities around the ResNeXt model: pretrained weight loading, image preprocessing and
//! prediction decoding.

pub mod image;
pub mod labels;
pub mod prediction;
pub mod weights;

pub use self::image::{
    apply_imagenet_normalization, dynamic_image_to_tensor, is_extension_supported,
    is_supported_image_format, load_image, open_image, preprocess, resize_and_center_crop,
    ImageError, ImageResult, IMAGENET_MEAN, IMAGENET_STD, MAX_CROP_SIZE,
};
pub use labels::{LabelError, Labels};
pub use prediction::{top_k, Prediction, PredictionError};
pub use weights::*;
