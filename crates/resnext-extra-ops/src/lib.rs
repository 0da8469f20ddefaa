//! Stateless building blocks for branch-and-merge networks on top of Burn.
//!
//! Burn composes modules as plain Rust structs, so a residual unit that feeds one input
//! through several branches and merges the results has no native "table" container.
//! This crate supplies the small pieces needed to write such units explicitly:
//!
//! - [`fan_out`] applies every branch to the same input and collects the outputs.
//! - [`Lambda`], [`LambdaMap`] and [`LambdaReduce`] apply, map or fold a function over
//!   the collected outputs.
//! - [`Identity`] is a parameter-free pass-through branch.
//! - [`flatten_batch`] and [`ensure_batched`] are the reshapes used by classifier heads.

mod identity;
mod table;
mod view;

#[doc(inline)]
pub use identity::Identity;
#[doc(inline)]
pub use table::{add, fan_out, mul, Lambda, LambdaMap, LambdaReduce, TableError};
#[doc(inline)]
pub use view::{ensure_batched, flatten_batch};
