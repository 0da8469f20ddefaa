//! Decoding classifier logits into ranked predictions.

use burn::tensor::{activation::softmax, backend::Backend, Tensor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("top-k requires k >= 1")]
    ZeroK,

    #[error("failed to read probabilities: {reason}")]
    TensorConversionError { reason: String },
}

/// One ranked class of a prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub probability: f32,
}

/// Softmax `[N, num_classes]` logits and keep the `k` most probable classes of each row.
///
/// Rows are sorted by descending probability; equal probabilities keep the lower class
/// index first. `k` larger than the class count returns every class.
///
/// # Errors
///
/// Returns [`PredictionError::ZeroK`] for `k == 0`.
pub fn top_k<B: Backend>(
    logits: Tensor<B, 2>,
    k: usize,
) -> Result<Vec<Vec<Prediction>>, PredictionError> {
    if k == 0 {
        return Err(PredictionError::ZeroK);
    }

    let [batch, num_classes] = logits.dims();
    let probabilities = softmax(logits, 1)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PredictionError::TensorConversionError {
            reason: format!("{e:?}"),
        })?;

    if num_classes == 0 {
        return Ok(vec![Vec::new(); batch]);
    }

    Ok(probabilities
        .chunks(num_classes)
        .map(|row| rank(row, k))
        .collect())
}

fn rank(probabilities: &[f32], k: usize) -> Vec<Prediction> {
    let mut ranked: Vec<Prediction> = probabilities
        .iter()
        .enumerate()
        .map(|(class_index, &probability)| Prediction {
            class_index,
            probability,
        })
        .collect();

    // Stable sort keeps lower indices first among equal probabilities.
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked.truncate(k);
    ranked
}
