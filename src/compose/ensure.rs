use tracing::warn;

use crate::{
    computation::{Computation, Outcome},
    coroutine::{Coroutine, Progress, Started},
    error::Error,
    step::Step,
    suspend::Suspend,
};

use super::await_teardown;

enum EnsureSignal<R> {
    Original(Result<R, Error>),
    Cleanup(Result<(), Error>),
    Unwound,
}

enum Stage<R> {
    Original,
    // Cleanup is running; holds the outcome to report afterwards, or `None` when unwinding.
    Cleanup(Option<Result<R, Error>>),
    Draining,
    Finished,
}

struct Ensure<I, R> {
    original: Computation<I, R>,
    cleanup: Computation<(), ()>,
    stage: Stage<R>,
}

impl<I: 'static, R: Clone + 'static> Ensure<I, R> {
    fn start_cleanup(&mut self, outcome: Result<R, Error>) -> Suspend<EnsureSignal<R>> {
        self.stage = Stage::Cleanup(Some(outcome));
        self.cleanup.resume(());
        Suspend::wait_with(&self.cleanup, |result| Ok(EnsureSignal::Cleanup(result)))
    }

    /// Run (or keep waiting for) the cleanup as part of a teardown.
    fn unwind_cleanup(&mut self) -> Step<Suspend<EnsureSignal<R>>, ()> {
        self.stage = Stage::Cleanup(None);
        self.cleanup.resume(());
        match self.cleanup.outcome() {
            Some(outcome) => {
                if let Outcome::Failed(error) = outcome.as_ref() {
                    self.cleanup_failed(error);
                }
                self.stage = Stage::Finished;
                Step::Complete(())
            }
            // A failure here fails the teardown computation.
            None => Step::Yielded(Suspend::wait_with(&self.cleanup, |result| {
                result.map(|()| EnsureSignal::Unwound)
            })),
        }
    }

    fn cleanup_failed(&self, error: &Error) {
        warn!(computation = %self.cleanup.id(), error = %error, "ensure cleanup failed");
    }
}

impl<I, R> Coroutine for Ensure<I, R>
where
    I: 'static,
    R: Clone + 'static,
{
    type Resume = EnsureSignal<R>;
    type Return = R;

    fn resume(&mut self, signal: EnsureSignal<R>) -> Progress<EnsureSignal<R>, R> {
        match signal {
            EnsureSignal::Original(outcome) => Step::Yielded(self.start_cleanup(outcome)),
            EnsureSignal::Cleanup(result) => {
                if let Err(error) = &result {
                    self.cleanup_failed(error);
                }
                match std::mem::replace(&mut self.stage, Stage::Finished) {
                    Stage::Cleanup(Some(outcome)) => Step::Complete(outcome),
                    _ => Step::Complete(Err(Error::msg("ensure finished without an outcome"))),
                }
            }
            EnsureSignal::Unwound => Step::Complete(Err(Error::msg("ensure resumed while unwinding"))),
        }
    }

    fn force_return(&mut self) -> Step<Suspend<EnsureSignal<R>>, ()> {
        match std::mem::replace(&mut self.stage, Stage::Finished) {
            Stage::Original => match self.original.interrupt() {
                Some(teardown) => {
                    self.stage = Stage::Draining;
                    await_teardown(Some(teardown), EnsureSignal::Unwound)
                }
                None => self.unwind_cleanup(),
            },
            Stage::Cleanup(_) => self.unwind_cleanup(),
            Stage::Draining | Stage::Finished => Step::Complete(()),
        }
    }

    fn unwind(&mut self, signal: EnsureSignal<R>) -> Step<Suspend<EnsureSignal<R>>, ()> {
        if matches!(self.stage, Stage::Draining) {
            return self.unwind_cleanup();
        }
        self.stage = Stage::Finished;
        if let EnsureSignal::Cleanup(Err(error)) = signal {
            self.cleanup_failed(&error);
        }
        Step::Complete(())
    }
}

impl<I: 'static, R: Clone + 'static> Computation<I, R> {
    /// Guaranteed finalization.
    ///
    /// The new computation runs this one and then, whatever the outcome, runs
    /// `cleanup` before reporting that outcome. The cleanup also runs when the
    /// new computation is interrupted; it then belongs to the teardown. A
    /// failing cleanup is logged and never replaces the original outcome.
    pub fn ensure<C, F>(&self, cleanup: F) -> Computation<I, R>
    where
        F: FnOnce(()) -> Started<C> + 'static,
        C: Coroutine<Return = ()> + 'static,
        C::Resume: 'static,
    {
        let original = self.clone();
        let cleanup = Computation::new(cleanup);
        Computation::new(move |input: I| {
            original.resume(input);
            let suspend = Suspend::wait_with(&original, |outcome| Ok(EnsureSignal::Original(outcome)));
            Step::Yielded((
                suspend,
                Ensure {
                    original,
                    cleanup,
                    stage: Stage::Original,
                },
            ))
        })
    }
}
