//! The suspension protocol.
//!
//! A [`Coroutine`] is a body of code paused at a suspension point. It is created
//! by a *block*: a function that receives a computation's initial input and runs
//! up to the first suspension point, returning a [`Started`] step. From then on
//! the driver calls [`Coroutine::resume`] with the value of each suspension
//! point until the coroutine completes.
//!
//! Cancellation goes through [`Coroutine::force_return`], which injects a
//! synthetic return at the current suspension point and runs any cleanup
//! sections. A cleanup section may itself suspend; the driver then feeds the
//! result of that suspension back through [`Coroutine::unwind`] until teardown
//! reports `Complete`.

use either::Either;

use crate::{error::Error, step::Step, suspend::Suspend};

/// What one call to [`Coroutine::resume`] reports.
pub type Progress<S, R> = Step<Suspend<S>, Result<R, Error>>;

/// What a block reports after running up to its first suspension point.
///
/// Either the coroutine suspended (and is handed back alongside the suspension),
/// or it finished without ever suspending.
pub type Started<C> = Step<
    (Suspend<<C as Coroutine>::Resume>, C),
    Result<<C as Coroutine>::Return, Error>,
>;

/// Type-erased coroutine.
pub type BoxCoroutine<S, R> = Box<dyn Coroutine<Resume = S, Return = R>>;

/// A resumable body with explicit suspension points.
///
/// ```rust
/// use strand::{Coroutine, Progress, Step, Suspend};
///
/// // Adds up inputs until it receives a zero.
/// struct Sum(u32);
///
/// impl Coroutine for Sum {
///     type Resume = u32;
///     type Return = u32;
///
///     fn resume(&mut self, input: u32) -> Progress<u32, u32> {
///         if input == 0 {
///             return Step::Complete(Ok(self.0));
///         }
///         self.0 += input;
///         Step::Yielded(Suspend::Park)
///     }
/// }
///
/// let mut sum = Sum(0);
/// assert!(sum.resume(3).is_yielded());
/// assert_eq!(sum.resume(0).unwrap_complete().unwrap(), 3);
/// ```
pub trait Coroutine {
    /// Value delivered at every suspension point.
    type Resume;
    /// Value produced on normal completion.
    type Return;

    /// Continue from the last suspension point with that point's result.
    fn resume(&mut self, input: Self::Resume) -> Progress<Self::Resume, Self::Return>;

    /// Inject a return at the current suspension point and start running
    /// cleanup sections.
    ///
    /// Reports `Yielded` when a cleanup section suspends; the driver resolves
    /// that suspension and continues with [`Coroutine::unwind`]. A coroutine
    /// without cleanup sections is fully torn down immediately.
    fn force_return(&mut self) -> Step<Suspend<Self::Resume>, ()> {
        Step::Complete(())
    }

    /// Continue a suspended cleanup section.
    fn unwind(&mut self, input: Self::Resume) -> Step<Suspend<Self::Resume>, ()> {
        drop(input);
        Step::Complete(())
    }

    fn boxed(self) -> BoxCoroutine<Self::Resume, Self::Return>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

/// Run a coroutine up to its first suspension point.
///
/// Useful for blocks whose coroutine should see the initial input through its
/// ordinary `resume` path.
pub fn start<C>(mut coroutine: C, input: C::Resume) -> Started<C>
where
    C: Coroutine,
{
    match coroutine.resume(input) {
        Step::Yielded(suspend) => Step::Yielded((suspend, coroutine)),
        Step::Complete(result) => Step::Complete(result),
    }
}

impl<S, R> Coroutine for Box<dyn Coroutine<Resume = S, Return = R>> {
    type Resume = S;
    type Return = R;

    fn resume(&mut self, input: S) -> Progress<S, R> {
        (**self).resume(input)
    }

    fn force_return(&mut self) -> Step<Suspend<S>, ()> {
        (**self).force_return()
    }

    fn unwind(&mut self, input: S) -> Step<Suspend<S>, ()> {
        (**self).unwind(input)
    }
}

impl<L, R> Coroutine for Either<L, R>
where
    L: Coroutine,
    R: Coroutine<Resume = L::Resume, Return = L::Return>,
{
    type Resume = L::Resume;
    type Return = L::Return;

    fn resume(&mut self, input: Self::Resume) -> Progress<Self::Resume, Self::Return> {
        match self {
            Either::Left(l) => l.resume(input),
            Either::Right(r) => r.resume(input),
        }
    }

    fn force_return(&mut self) -> Step<Suspend<Self::Resume>, ()> {
        match self {
            Either::Left(l) => l.force_return(),
            Either::Right(r) => r.force_return(),
        }
    }

    fn unwind(&mut self, input: Self::Resume) -> Step<Suspend<Self::Resume>, ()> {
        match self {
            Either::Left(l) => l.unwind(input),
            Either::Right(r) => r.unwind(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown(u32);

    impl Coroutine for Countdown {
        type Resume = ();
        type Return = &'static str;

        fn resume(&mut self, (): ()) -> Progress<(), &'static str> {
            if self.0 == 0 {
                return Step::Complete(Ok("liftoff"));
            }
            self.0 -= 1;
            Step::Yielded(Suspend::Park)
        }
    }

    struct Echo;

    impl Coroutine for Echo {
        type Resume = ();
        type Return = &'static str;

        fn resume(&mut self, (): ()) -> Progress<(), &'static str> {
            Step::Complete(Ok("echo"))
        }

        fn force_return(&mut self) -> Step<Suspend<()>, ()> {
            Step::Yielded(Suspend::Park)
        }
    }

    #[test]
    fn test_start_runs_to_first_suspension() {
        let (suspend, mut rest) = start(Countdown(1), ()).unwrap_yielded();
        assert!(matches!(suspend, Suspend::Park));
        assert_eq!(rest.resume(()).unwrap_complete().unwrap(), "liftoff");
    }

    #[test]
    fn test_start_reports_immediate_completion() {
        let done = start(Countdown(0), ()).unwrap_complete();
        assert_eq!(done.unwrap(), "liftoff");
    }

    #[test]
    fn test_default_teardown_is_immediate() {
        let mut countdown = Countdown(3);
        assert!(countdown.force_return().is_complete());
        assert!(countdown.unwind(()).is_complete());
    }

    #[test]
    fn test_boxed_and_either_delegate() {
        let mut boxed = Countdown(0).boxed();
        assert_eq!(boxed.resume(()).unwrap_complete().unwrap(), "liftoff");

        let mut right: Either<Countdown, Echo> = Either::Right(Echo);
        assert!(right.force_return().is_yielded());
        assert_eq!(right.resume(()).unwrap_complete().unwrap(), "echo");

        let mut left: Either<Countdown, Echo> = Either::Left(Countdown(0));
        assert!(left.force_return().is_complete());
    }
}
