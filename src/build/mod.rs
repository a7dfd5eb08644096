//! Building blocks from scratch
//!
//! A block is what a [`Computation`](crate::Computation) is made from: a
//! function of the initial input that runs up to the first suspension point.

mod func;
mod routine;

pub use func::{done, fail, from_fn, FromFn};
pub use routine::{routine, Routine, Scope};
