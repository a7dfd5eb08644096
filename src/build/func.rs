use std::marker::PhantomData;

use crate::{
    coroutine::{self, BoxCoroutine, Coroutine, Progress, Started},
    error::Error,
    step::Step,
};

/// A coroutine driven by a closure.
///
/// The closure sees the initial input on its first call and the value of each
/// suspension point afterwards, so both must share one type.
pub struct FromFn<S, R, F> {
    f: F,
    _marker: PhantomData<fn(S) -> R>,
}

impl<S, R, F> Coroutine for FromFn<S, R, F>
where
    F: FnMut(S) -> Progress<S, R>,
{
    type Resume = S;
    type Return = R;

    fn resume(&mut self, input: S) -> Progress<S, R> {
        (self.f)(input)
    }
}

/// Create a block from a closure.
///
/// ```rust
/// use strand::{build::from_fn, Computation, Step, Suspend};
///
/// let mut seen = 0;
/// let countdown = Computation::new(from_fn(move |n: u32| {
///     seen += 1;
///     if n == 0 { Step::Complete(Ok(seen)) } else { Step::Yielded(Suspend::Park) }
/// }));
///
/// countdown.resume(0);
/// assert_eq!(countdown.result(), Some(1));
/// ```
pub fn from_fn<S, R, F>(f: F) -> impl FnOnce(S) -> Started<FromFn<S, R, F>>
where
    F: FnMut(S) -> Progress<S, R>,
{
    move |input| {
        coroutine::start(
            FromFn {
                f,
                _marker: PhantomData,
            },
            input,
        )
    }
}

/// A block that succeeds with `value` without suspending.
pub fn done<I, R: 'static>(value: R) -> impl FnOnce(I) -> Started<BoxCoroutine<(), R>> {
    move |_| Step::Complete(Ok(value))
}

/// A block that fails with `error` without suspending.
pub fn fail<I, R: 'static>(error: Error) -> impl FnOnce(I) -> Started<BoxCoroutine<(), R>> {
    move |_| Step::Complete(Err(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        computation::{Computation, Status},
        suspend::Suspend,
    };

    #[test]
    fn test_from_fn_sees_initial_input_first() {
        let mut inputs = Vec::new();
        let block = from_fn(move |n: u32| {
            inputs.push(n);
            if inputs.len() < 3 {
                Step::Yielded(Suspend::Park)
            } else {
                Step::Complete(Ok(inputs.clone()))
            }
        });

        let (_, mut rest) = block(1).unwrap_yielded();
        assert!(rest.resume(2).is_yielded());
        assert_eq!(rest.resume(3).unwrap_complete().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_done_and_fail_settle_on_resume() {
        let ok = Computation::new(done::<&str, u32>(9));
        let broken = Computation::new(fail::<&str, u32>(Error::msg("nope")));

        ok.resume("go");
        broken.resume("go");

        assert_eq!(ok.result(), Some(9));
        assert_eq!(broken.status(), Status::Failed);
    }
}
