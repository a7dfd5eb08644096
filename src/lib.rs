//! # Strand: Structured Concurrency from Resumable Coroutines
//!
//! Express sequences of suspended work that can wait on nested computations,
//! be cancelled with guaranteed cleanup, and be composed, all on one logical
//! thread with no native threads or async runtime underneath.
//!
//! ## Core Types
//!
//! - **[`Coroutine`]**: a body paused at explicit suspension points
//! - **[`Computation`]**: drives exactly one coroutine and settles exactly once
//! - **[`Operation`]**: a stateless effect, run by handing it a [`Continuation`]
//! - **[`Suspend`]**: what a coroutine yields: await a computation, perform an
//!   operation, or park
//!
//! ## Key Features
//!
//! - **Lazy**: nothing runs until [`Computation::resume`]
//! - **Composable**: [`then`](Computation::then), [`before`](Computation::before),
//!   [`rescue`](Computation::rescue) and [`ensure`](Computation::ensure)
//! - **Cancellable**: [`Computation::interrupt`] settles at once and hands back
//!   whatever cleanup still has to suspend
//! - **Deterministic**: scheduling goes through an injected
//!   [`Runtime`](runtime::Runtime); [`TaskQueue`](runtime::TaskQueue) runs on a
//!   virtual clock
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use strand::prelude::*;
//!
//! let queue = TaskQueue::new();
//! let nap = timeout(&queue.runtime(), Duration::from_millis(250));
//!
//! let wake = Computation::new(from_fn(move |slept: bool| {
//!     if slept {
//!         Step::Complete(Ok(21))
//!     } else {
//!         Step::Yielded(Suspend::perform_map(nap.clone(), |()| true))
//!     }
//! }));
//! let answer = wake.then(from_fn(|n: u32| Step::Complete(Ok(n * 2))));
//!
//! assert_eq!(run(&queue, &answer, false).unwrap(), 42);
//! assert_eq!(queue.now(), Duration::from_millis(250));
//! ```
//!
//! ## Common Functions
//!
//! **Building blocks:**
//! - [`from_fn(f)`](build::from_fn) - Coroutine from a closure
//! - [`routine(body)`](build::routine) - Coroutine with cleanup sections
//! - [`done(value)`](build::done) / [`fail(error)`](build::fail) - Settle at once
//!
//! **Operations:**
//! - [`timeout`](ops::timeout), [`resume`](ops::resume), [`fork`](ops::fork), [`halt`](ops::halt)
//!
//! **Execution:**
//! - [`run(queue, computation, input)`](handler::run) - Drive to completion

pub mod build;
pub mod handler;
pub mod ops;
pub mod prelude;
pub mod runtime;

mod compose;
mod computation;
mod coroutine;
mod error;
mod operation;
mod step;
mod suspend;

pub use computation::{Computation, ComputationId, Outcome, Status, Subscription};
pub use coroutine::{start, BoxCoroutine, Coroutine, Progress, Started};
pub use error::Error;
pub use operation::Operation;
pub use step::Step;
pub use suspend::{Awaiting, Continuation, Effect, Suspend};
