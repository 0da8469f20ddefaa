use resnext_extra_ops::TableError;
use thiserror::Error;

/// The error type for ResNeXt model construction and inference.
#[derive(Error, Debug)]
pub enum ResNeXtError {
    /// The configuration cannot produce a valid network.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// An input tensor does not have the shape the network expects.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// A branch-and-merge step produced no outputs to merge.
    #[error("Residual merge failed: {0}")]
    Table(#[from] TableError),
}

/// A specialized `Result` type for ResNeXt operations.
pub type ResNeXtResult<T> = Result<T, ResNeXtError>;
