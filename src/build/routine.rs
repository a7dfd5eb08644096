//! Coroutines with guaranteed cleanup sections.
//!
//! A routine is a body plus a stack of cleanups registered on its [`Scope`]
//! while it runs. Cleanups run in reverse registration order, both when the
//! body finishes and when the routine is torn down by an interrupt. A cleanup
//! may itself suspend (to wait for a timer, say); on an interrupt that part of
//! the teardown is what [`Computation::interrupt`](crate::Computation::interrupt)
//! hands back.

use tracing::{trace, warn};

use crate::{
    coroutine::{self, BoxCoroutine, Coroutine, Progress, Started},
    error::Error,
    step::Step,
    suspend::Suspend,
};

enum Cleanup<S> {
    Plain(Box<dyn FnOnce()>),
    Suspending(Box<dyn FnOnce() -> Started<BoxCoroutine<S, ()>>>),
}

/// Cleanup registry handed to a routine body.
pub struct Scope<S> {
    cleanups: Vec<Cleanup<S>>,
}

impl<S: 'static> Scope<S> {
    fn new() -> Self {
        Scope {
            cleanups: Vec::new(),
        }
    }

    /// Register a cleanup that runs without suspending.
    pub fn defer<F>(&mut self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        self.cleanups.push(Cleanup::Plain(Box::new(cleanup)));
    }

    /// Register a cleanup that may suspend.
    ///
    /// A cleanup completing with `Err` is logged and never replaces the
    /// routine's own outcome. A cleanup that wants to survive the failure of
    /// something it awaits should use [`Suspend::attempt`].
    pub fn defer_with<C, F>(&mut self, block: F)
    where
        F: FnOnce() -> Started<C> + 'static,
        C: Coroutine<Resume = S, Return = ()> + 'static,
    {
        self.cleanups.push(Cleanup::Suspending(Box::new(move || {
            block().map_yielded(|(suspend, cleanup)| (suspend, cleanup.boxed()))
        })));
    }

    /// Number of cleanups that have not run yet.
    pub fn pending(&self) -> usize {
        self.cleanups.len()
    }
}

enum Phase<R> {
    Body,
    // The body finished with this result; cleanups are running.
    Finally(Result<R, Error>),
    Unwinding,
    Done,
}

enum Active<S> {
    Running(BoxCoroutine<S, ()>),
    Unwinding(BoxCoroutine<S, ()>),
}

/// Coroutine built by [`routine`].
pub struct Routine<S, R, F> {
    body: F,
    scope: Scope<S>,
    phase: Phase<R>,
    active: Option<Active<S>>,
}

impl<S: 'static, R, F> Routine<S, R, F> {
    /// Advance the cleanup that is currently suspended, if any.
    fn step_active(&mut self, input: S) -> Step<Suspend<S>, ()> {
        match self.active.take() {
            None => Step::Complete(()),
            Some(Active::Running(mut cleanup)) => match cleanup.resume(input) {
                Step::Yielded(suspend) => {
                    self.active = Some(Active::Running(cleanup));
                    Step::Yielded(suspend)
                }
                Step::Complete(Ok(())) => Step::Complete(()),
                Step::Complete(Err(error)) => {
                    warn!(error = %error, "cleanup failed");
                    Step::Complete(())
                }
            },
            Some(Active::Unwinding(mut cleanup)) => match cleanup.unwind(input) {
                Step::Yielded(suspend) => {
                    self.active = Some(Active::Unwinding(cleanup));
                    Step::Yielded(suspend)
                }
                Step::Complete(()) => Step::Complete(()),
            },
        }
    }

    /// Pop and run cleanups until one suspends or none are left.
    fn run_cleanups(&mut self) -> Step<Suspend<S>, ()> {
        while let Some(cleanup) = self.scope.cleanups.pop() {
            match cleanup {
                Cleanup::Plain(cleanup) => cleanup(),
                Cleanup::Suspending(block) => match block() {
                    Step::Yielded((suspend, cleanup)) => {
                        self.active = Some(Active::Running(cleanup));
                        return Step::Yielded(suspend);
                    }
                    Step::Complete(Ok(())) => {}
                    Step::Complete(Err(error)) => warn!(error = %error, "cleanup failed"),
                },
            }
        }
        Step::Complete(())
    }

    fn finish(&mut self) -> Progress<S, R> {
        match self.run_cleanups() {
            Step::Yielded(suspend) => Step::Yielded(suspend),
            Step::Complete(()) => match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Finally(result) => Step::Complete(result),
                _ => Step::Complete(Err(Error::msg("routine finished without a result"))),
            },
        }
    }

    fn unwind_rest(&mut self) -> Step<Suspend<S>, ()> {
        let step = self.run_cleanups();
        if step.is_complete() {
            trace!("routine torn down");
            self.phase = Phase::Done;
        }
        step
    }
}

impl<S, R, F> Coroutine for Routine<S, R, F>
where
    S: 'static,
    F: FnMut(&mut Scope<S>, S) -> Progress<S, R>,
{
    type Resume = S;
    type Return = R;

    fn resume(&mut self, input: S) -> Progress<S, R> {
        match self.phase {
            Phase::Body => match (self.body)(&mut self.scope, input) {
                Step::Yielded(suspend) => Step::Yielded(suspend),
                Step::Complete(result) => {
                    self.phase = Phase::Finally(result);
                    self.finish()
                }
            },
            Phase::Finally(_) => match self.step_active(input) {
                Step::Yielded(suspend) => Step::Yielded(suspend),
                Step::Complete(()) => self.finish(),
            },
            Phase::Unwinding | Phase::Done => {
                Step::Complete(Err(Error::msg("routine resumed after it finished")))
            }
        }
    }

    fn force_return(&mut self) -> Step<Suspend<S>, ()> {
        if matches!(self.phase, Phase::Done) {
            return Step::Complete(());
        }
        self.phase = Phase::Unwinding;
        match self.active.take() {
            Some(Active::Running(mut cleanup)) | Some(Active::Unwinding(mut cleanup)) => {
                if let Step::Yielded(suspend) = cleanup.force_return() {
                    self.active = Some(Active::Unwinding(cleanup));
                    return Step::Yielded(suspend);
                }
            }
            None => {}
        }
        self.unwind_rest()
    }

    fn unwind(&mut self, input: S) -> Step<Suspend<S>, ()> {
        match self.step_active(input) {
            Step::Yielded(suspend) => Step::Yielded(suspend),
            Step::Complete(()) => self.unwind_rest(),
        }
    }
}

/// Create a block whose body can register cleanups.
///
/// The body is called with the initial input and then with the value of each
/// suspension point, exactly like [`from_fn`](super::from_fn).
///
/// ```rust
/// use std::{cell::RefCell, rc::Rc};
/// use strand::{build::{routine, Scope}, Computation, Step, Suspend};
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let task: Computation<(), ()> = Computation::new(routine({
///     let log = Rc::clone(&log);
///     move |scope: &mut Scope<()>, (): ()| {
///         let log = Rc::clone(&log);
///         scope.defer(move || log.borrow_mut().push("released"));
///         Step::Yielded(Suspend::Park)
///     }
/// }));
///
/// task.resume(());
/// assert!(log.borrow().is_empty());
///
/// assert!(task.interrupt().is_none());
/// assert_eq!(*log.borrow(), vec!["released"]);
/// ```
pub fn routine<S, R, F>(body: F) -> impl FnOnce(S) -> Started<Routine<S, R, F>>
where
    S: 'static,
    F: FnMut(&mut Scope<S>, S) -> Progress<S, R>,
{
    move |input| {
        coroutine::start(
            Routine {
                body,
                scope: Scope::new(),
                phase: Phase::Body,
                active: None,
            },
            input,
        )
    }
}
