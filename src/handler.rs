//! Functions for driving computations to completion.
//!
//! A computation only advances when something resumes it. These helpers start
//! one and pump a [`TaskQueue`] until it has settled.

use tracing::debug;

use crate::{computation::Computation, error::Error, runtime::TaskQueue};

/// Start `computation` with `input` and run `queue` until it settles.
///
/// Returns the computation's result, its failure, [`Error::Interrupted`] if
/// it was interrupted, or [`Error::Stalled`] if the queue ran out of work (or
/// hit its task limit) first.
///
/// ```rust
/// use std::time::Duration;
/// use strand::{build::from_fn, handler::run, ops::timeout, runtime::TaskQueue, Computation, Step, Suspend};
///
/// let queue = TaskQueue::new();
/// let nap = timeout(&queue.runtime(), Duration::from_secs(3));
/// let napper = Computation::new(from_fn(move |rested: bool| {
///     if rested {
///         Step::Complete(Ok("refreshed"))
///     } else {
///         Step::Yielded(Suspend::perform_map(nap.clone(), |()| true))
///     }
/// }));
///
/// assert_eq!(run(&queue, &napper, false).unwrap(), "refreshed");
/// assert_eq!(queue.now(), Duration::from_secs(3));
/// ```
pub fn run<I, R>(queue: &TaskQueue, computation: &Computation<I, R>, input: I) -> Result<R, Error>
where
    I: 'static,
    R: Clone + 'static,
{
    computation.resume(input);
    settle(queue, computation)
}

/// Run `queue` until an already started `computation` settles.
pub fn settle<I, R>(queue: &TaskQueue, computation: &Computation<I, R>) -> Result<R, Error>
where
    I: 'static,
    R: Clone + 'static,
{
    let mut ran = 0usize;
    while !computation.is_done() {
        if queue.config().max_tasks.is_some_and(|max| ran >= max) || !queue.tick() {
            break;
        }
        ran += 1;
    }
    debug!(computation = %computation.id(), ran, status = ?computation.status(), "driver stopped");
    match computation.outcome() {
        Some(outcome) => outcome.linked(),
        None => Err(Error::Stalled(computation.id())),
    }
}
