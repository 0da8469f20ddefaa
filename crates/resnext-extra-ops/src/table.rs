//! # Table combinators
//!
//! A "table" is the ordered list of outputs produced by feeding one input through several
//! branches. [`fan_out`] builds the table; [`Lambda`], [`LambdaMap`] and [`LambdaReduce`]
//! consume it. Each combinator also offers `apply`, which fans the input out and consumes
//! the resulting table in one step.
//!
//! ```ignore
//! let merge = LambdaReduce::new(add);
//! let out = merge.apply(x, &[&|x| residual.forward(x), &|x| shortcut.forward(x)])?;
//! ```

use core::fmt;

use burn::prelude::*;
use thiserror::Error;

/// Errors raised while consuming a table of branch outputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// A reduction was asked to fold a table with no entries.
    #[error("cannot reduce an empty table of branch outputs")]
    EmptyTable,
}

/// Apply every branch to `input` and collect the outputs in branch order.
///
/// The input is cloned for all branches but the last, which takes it by value.
/// With no branches the input itself is the only entry of the table.
pub fn fan_out<T: Clone>(input: T, branches: &[&dyn Fn(T) -> T]) -> Vec<T> {
    let Some((last, rest)) = branches.split_last() else {
        return vec![input];
    };

    let mut outputs = Vec::with_capacity(branches.len());
    for branch in rest {
        outputs.push(branch(input.clone()));
    }
    outputs.push(last(input));
    outputs
}

/// Applies a function to the whole table of branch outputs.
#[derive(Clone, Copy)]
pub struct Lambda<F> {
    func: F,
}

impl<F> Lambda<F> {
    pub const fn new(func: F) -> Self {
        Self { func }
    }

    pub fn forward<T, U>(&self, outputs: Vec<T>) -> U
    where
        F: Fn(Vec<T>) -> U,
    {
        (self.func)(outputs)
    }

    pub fn apply<T: Clone, U>(&self, input: T, branches: &[&dyn Fn(T) -> T]) -> U
    where
        F: Fn(Vec<T>) -> U,
    {
        self.forward(fan_out(input, branches))
    }
}

/// Maps a function over each branch output, preserving order.
#[derive(Clone, Copy)]
pub struct LambdaMap<F> {
    func: F,
}

impl<F> LambdaMap<F> {
    pub const fn new(func: F) -> Self {
        Self { func }
    }

    pub fn forward<T, U>(&self, outputs: Vec<T>) -> Vec<U>
    where
        F: Fn(T) -> U,
    {
        outputs.into_iter().map(&self.func).collect()
    }

    pub fn apply<T: Clone, U>(&self, input: T, branches: &[&dyn Fn(T) -> T]) -> Vec<U>
    where
        F: Fn(T) -> U,
    {
        self.forward(fan_out(input, branches))
    }
}

/// Left-folds a binary function across the branch outputs.
///
/// `[o0, o1, o2]` reduces to `f(f(o0, o1), o2)`; a single output is returned unchanged.
#[derive(Clone, Copy)]
pub struct LambdaReduce<F> {
    func: F,
}

impl<F> LambdaReduce<F> {
    pub const fn new(func: F) -> Self {
        Self { func }
    }

    /// # Errors
    ///
    /// Returns [`TableError::EmptyTable`] when `outputs` is empty.
    pub fn forward<T>(&self, outputs: Vec<T>) -> Result<T, TableError>
    where
        F: Fn(T, T) -> T,
    {
        outputs
            .into_iter()
            .reduce(&self.func)
            .ok_or(TableError::EmptyTable)
    }

    /// Never fails for a non-empty table, which [`fan_out`] always produces.
    ///
    /// # Errors
    ///
    /// See [`LambdaReduce::forward`].
    pub fn apply<T: Clone>(&self, input: T, branches: &[&dyn Fn(T) -> T]) -> Result<T, TableError>
    where
        F: Fn(T, T) -> T,
    {
        self.forward(fan_out(input, branches))
    }
}

macro_rules! opaque_debug {
    ($($name:ident),*) => {
        $(
            impl<F> fmt::Debug for $name<F> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(stringify!($name))
                }
            }
        )*
    };
}

opaque_debug!(Lambda, LambdaMap, LambdaReduce);

/// Element-wise sum, the merge of a residual unit.
pub fn add<B: Backend, const D: usize>(lhs: Tensor<B, D>, rhs: Tensor<B, D>) -> Tensor<B, D> {
    lhs + rhs
}

/// Element-wise product.
pub fn mul<B: Backend, const D: usize>(lhs: Tensor<B, D>, rhs: Tensor<B, D>) -> Tensor<B, D> {
    lhs * rhs
}
