//! Combining computations together
//!
//! Every combinator returns a new [`Computation`] that drives its operands;
//! the operands themselves are never changed. A combinator owns what it drives:
//! interrupting it interrupts the operand in flight and waits for that
//! operand's teardown.

mod ensure;
mod rescue;
mod then;

use tracing::warn;

use crate::{computation::Computation, step::Step, suspend::Suspend};

/// Run an operand's remaining teardown and resume with `signal` once it is over.
fn await_teardown<S: 'static>(teardown: Option<Computation<(), ()>>, signal: S) -> Step<Suspend<S>, ()> {
    let Some(teardown) = teardown else {
        return Step::Complete(());
    };
    let id = teardown.id();
    teardown.resume(());
    Step::Yielded(Suspend::wait_with(&teardown, move |result: Result<(), _>| {
        if let Err(error) = result {
            warn!(computation = %id, error = %error, "operand teardown failed");
        }
        Ok(signal)
    }))
}
