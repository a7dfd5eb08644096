use either::Either;
use tracing::debug;

use crate::{
    computation::Computation,
    coroutine::{Coroutine, Progress, Started},
    error::Error,
    step::Step,
    suspend::Suspend,
};

use super::await_teardown;

enum RescueSignal<R, H> {
    Original(Result<R, Error>),
    Handler(H),
    Unwound,
}

struct Rescue<I, R, H> {
    original: Computation<I, R>,
    handler: Computation<Error, H>,
}

impl<I, R, H> Coroutine for Rescue<I, R, H>
where
    I: 'static,
    R: Clone + 'static,
    H: Clone + 'static,
{
    type Resume = RescueSignal<R, H>;
    type Return = Either<R, H>;

    fn resume(&mut self, signal: RescueSignal<R, H>) -> Progress<RescueSignal<R, H>, Either<R, H>> {
        match signal {
            RescueSignal::Original(Ok(result)) => Step::Complete(Ok(Either::Left(result))),
            RescueSignal::Original(Err(error)) => {
                debug!(computation = %self.original.id(), error = %error, "rescuing failure");
                self.handler.resume(error);
                Step::Yielded(Suspend::wait_map(&self.handler, RescueSignal::Handler))
            }
            RescueSignal::Handler(recovered) => Step::Complete(Ok(Either::Right(recovered))),
            RescueSignal::Unwound => Step::Complete(Err(Error::msg("rescue resumed while unwinding"))),
        }
    }

    fn force_return(&mut self) -> Step<Suspend<RescueSignal<R, H>>, ()> {
        let teardown = self.handler.interrupt().or_else(|| self.original.interrupt());
        await_teardown(teardown, RescueSignal::Unwound)
    }
}

impl<I: 'static, R: Clone + 'static> Computation<I, R> {
    /// Error recovery.
    ///
    /// The new computation runs this one; if it fails (or is interrupted) the
    /// error is handed to `handler` instead of propagating. The result says
    /// which of the two produced it.
    ///
    /// ```rust
    /// use either::Either;
    /// use strand::{build::{fail, from_fn}, Computation, Error, Step};
    ///
    /// let flaky = Computation::new(fail::<(), u32>(Error::msg("offline")));
    /// let safe = flaky.rescue(from_fn(|e: Error| Step::Complete(Ok(e.to_string()))));
    ///
    /// safe.resume(());
    /// assert_eq!(safe.result(), Some(Either::Right("offline".to_string())));
    /// ```
    pub fn rescue<C, F>(&self, handler: F) -> Computation<I, Either<R, C::Return>>
    where
        F: FnOnce(Error) -> Started<C> + 'static,
        C: Coroutine + 'static,
        C::Resume: 'static,
        C::Return: Clone + 'static,
    {
        let original = self.clone();
        let handler = Computation::new(handler);
        Computation::new(move |input: I| {
            original.resume(input);
            let suspend = Suspend::wait_with(&original, |result| Ok(RescueSignal::Original(result)));
            Step::Yielded((suspend, Rescue { original, handler }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        build::{done, fail, from_fn, routine, Scope},
        computation::Status,
    };
    use std::{cell::Cell, rc::Rc};

    #[test]
    fn test_success_passes_through_on_the_left() {
        let fine = Computation::new(done::<(), u32>(3));
        let guarded = fine.rescue(from_fn(|_: Error| Step::Complete(Ok("unused"))));

        guarded.resume(());

        assert_eq!(guarded.result(), Some(Either::Left(3)));
    }

    #[test]
    fn test_failure_is_handled_on_the_right() {
        let handled = Rc::new(Cell::new(false));
        let broken = Computation::new(fail::<(), u32>(Error::msg("bad input")));
        let guarded = broken.rescue({
            let handled = Rc::clone(&handled);
            from_fn(move |e: Error| {
                handled.set(true);
                Step::Complete(Ok(format!("recovered from {e}")))
            })
        });

        guarded.resume(());

        assert!(handled.get());
        assert_eq!(
            guarded.result(),
            Some(Either::Right("recovered from bad input".to_string()))
        );
        assert_eq!(broken.status(), Status::Failed);
    }

    #[test]
    fn test_interruption_of_original_is_rescued() {
        let stuck: Computation<(), u32> = Computation::new(routine(|_: &mut Scope<()>, (): ()| {
            Step::Yielded(Suspend::Park)
        }));
        let guarded = stuck.rescue(from_fn(|e: Error| Step::Complete(Ok(e.is_interrupted()))));

        guarded.resume(());
        stuck.interrupt();

        assert_eq!(guarded.result(), Some(Either::Right(true)));
    }

    #[test]
    fn test_handler_failure_propagates() {
        let broken = Computation::new(fail::<(), u32>(Error::msg("first")));
        let guarded = broken.rescue(fail::<Error, u32>(Error::msg("second")));

        guarded.resume(());

        assert_eq!(guarded.error().unwrap().to_string(), "second");
    }
}
