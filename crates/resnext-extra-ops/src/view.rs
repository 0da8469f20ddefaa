//! Reshapes used between the pooled feature map and a linear classifier.

use burn::prelude::*;

/// Collapse every dimension after the batch dimension: `[N, d1, .., dk] -> [N, d1 * .. * dk]`.
///
/// `D` must be at least 2.
pub fn flatten_batch<B: Backend, const D: usize>(input: Tensor<B, D>) -> Tensor<B, 2> {
    input.flatten(1, D - 1)
}

/// Give an unbatched feature vector a batch dimension of one: `[C] -> [1, C]`.
pub fn ensure_batched<B: Backend>(input: Tensor<B, 1>) -> Tensor<B, 2> {
    input.unsqueeze::<2>()
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, Tensor};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn flatten_batch_collapses_feature_dimensions() {
        let device = Default::default();
        let pooled = Tensor::<TestBackend, 4>::random(
            [3, 2048, 1, 1],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(flatten_batch(pooled).dims(), [3, 2048]);

        let map = Tensor::<TestBackend, 4>::zeros([2, 8, 2, 3], &device);
        assert_eq!(flatten_batch(map).dims(), [2, 48]);
    }

    #[test]
    fn flatten_batch_keeps_rank_two_input() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 2>::zeros([5, 7], &device);
        assert_eq!(flatten_batch(features).dims(), [5, 7]);
    }

    #[test]
    fn ensure_batched_adds_leading_dimension() {
        let device = Default::default();
        let vector = Tensor::<TestBackend, 1>::zeros([2048], &device);
        assert_eq!(ensure_batched(vector).dims(), [1, 2048]);
    }
}
