//! Identity module implementation

use core::marker::PhantomData;

use burn::prelude::*;

/// Parameter-free branch that returns its input unchanged.
///
/// Used as the shortcut of a residual unit whose input and output shapes already agree.
#[derive(Module, Debug)]
pub struct Identity<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> Identity<B> {
    /// Create new Identity module
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }

    /// Forward pass (identity function)
    pub const fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        input
    }
}

impl<B: Backend> Default for Identity<B> {
    fn default() -> Self {
        Self::new()
    }
}
