use crate::{
    computation::Computation,
    coroutine::{Coroutine, Progress, Started},
    error::Error,
    step::Step,
    suspend::Suspend,
};

use super::await_teardown;

enum ThenSignal<R, Out> {
    Antecedent(R),
    Stage(Out),
    Unwound,
}

struct Then<I, R, Out> {
    antecedent: Computation<I, R>,
    stage: Computation<R, Out>,
}

impl<I, R, Out> Coroutine for Then<I, R, Out>
where
    I: 'static,
    R: Clone + 'static,
    Out: Clone + 'static,
{
    type Resume = ThenSignal<R, Out>;
    type Return = Out;

    fn resume(&mut self, signal: ThenSignal<R, Out>) -> Progress<ThenSignal<R, Out>, Out> {
        match signal {
            ThenSignal::Antecedent(result) => {
                self.stage.resume(result);
                Step::Yielded(Suspend::wait_map(&self.stage, ThenSignal::Stage))
            }
            ThenSignal::Stage(out) => Step::Complete(Ok(out)),
            ThenSignal::Unwound => Step::Complete(Err(Error::msg("sequence resumed while unwinding"))),
        }
    }

    fn force_return(&mut self) -> Step<Suspend<ThenSignal<R, Out>>, ()> {
        let teardown = self.stage.interrupt().or_else(|| self.antecedent.interrupt());
        await_teardown(teardown, ThenSignal::Unwound)
    }
}

enum BeforeSignal<I, R> {
    Prelude(I),
    Original(R),
    Unwound,
}

struct Before<P, I, R> {
    prelude: Computation<P, I>,
    original: Computation<I, R>,
}

impl<P, I, R> Coroutine for Before<P, I, R>
where
    P: 'static,
    I: Clone + 'static,
    R: Clone + 'static,
{
    type Resume = BeforeSignal<I, R>;
    type Return = R;

    fn resume(&mut self, signal: BeforeSignal<I, R>) -> Progress<BeforeSignal<I, R>, R> {
        match signal {
            BeforeSignal::Prelude(input) => {
                self.original.resume(input);
                Step::Yielded(Suspend::wait_map(&self.original, BeforeSignal::Original))
            }
            BeforeSignal::Original(result) => Step::Complete(Ok(result)),
            BeforeSignal::Unwound => Step::Complete(Err(Error::msg("sequence resumed while unwinding"))),
        }
    }

    fn force_return(&mut self) -> Step<Suspend<BeforeSignal<I, R>>, ()> {
        let teardown = self.original.interrupt().or_else(|| self.prelude.interrupt());
        await_teardown(teardown, BeforeSignal::Unwound)
    }
}

impl<I: 'static, R: Clone + 'static> Computation<I, R> {
    /// Sequential composition.
    ///
    /// The new computation starts this one with its input and, once it
    /// succeeds, runs `block` with the result. A failure here settles the new
    /// computation with that failure and `block` never runs.
    ///
    /// ```rust
    /// use strand::{build::from_fn, Computation, Step};
    ///
    /// let parse = Computation::new(from_fn(|text: &str| Step::Complete(Ok(text.len() as u32))));
    /// let doubled = parse.then(from_fn(|n: u32| Step::Complete(Ok(n * 2))));
    ///
    /// doubled.resume("four");
    /// assert_eq!(doubled.result(), Some(8));
    /// ```
    pub fn then<C, F>(&self, block: F) -> Computation<I, C::Return>
    where
        F: FnOnce(R) -> Started<C> + 'static,
        C: Coroutine + 'static,
        C::Resume: 'static,
        C::Return: Clone + 'static,
    {
        let antecedent = self.clone();
        let stage = Computation::new(block);
        Computation::new(move |input: I| {
            antecedent.resume(input);
            let suspend = Suspend::wait_map(&antecedent, ThenSignal::Antecedent);
            Step::Yielded((suspend, Then { antecedent, stage }))
        })
    }

    /// Run `block` first and start this computation with its result.
    pub fn before<P, C, F>(&self, block: F) -> Computation<P, R>
    where
        P: 'static,
        I: Clone,
        F: FnOnce(P) -> Started<C> + 'static,
        C: Coroutine<Return = I> + 'static,
        C::Resume: 'static,
    {
        let original = self.clone();
        let prelude = Computation::new(block);
        Computation::new(move |input: P| {
            prelude.resume(input);
            let suspend = Suspend::wait_map(&prelude, BeforeSignal::Prelude);
            Step::Yielded((suspend, Before { prelude, original }))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        build::{fail, from_fn, routine, Scope},
        computation::{Computation, Status},
        error::Error,
        step::Step,
        suspend::Suspend,
    };
    use std::{cell::Cell, rc::Rc};

    #[test]
    fn test_then_feeds_result_forward() {
        let base = Computation::new(from_fn(|n: u32| Step::Complete(Ok(n + 1))));
        let chained = base
            .then(from_fn(|n: u32| Step::Complete(Ok(n * 10))))
            .then(from_fn(|n: u32| Step::Complete(Ok(format!("got {n}")))));

        chained.resume(4);

        assert_eq!(chained.result().as_deref(), Some("got 50"));
        assert_eq!(base.result(), Some(5));
    }

    #[test]
    fn test_failed_stage_skips_rest_of_chain() {
        let ran = Rc::new(Cell::new(false));
        let first = Computation::new(fail::<(), u32>(Error::msg("stage one broke")));
        let chained = first.then({
            let ran = Rc::clone(&ran);
            from_fn(move |n: u32| {
                ran.set(true);
                Step::Complete(Ok(n))
            })
        });

        chained.resume(());

        assert!(!ran.get());
        assert_eq!(chained.status(), Status::Failed);
        assert_eq!(chained.error().unwrap().to_string(), "stage one broke");
    }

    #[test]
    fn test_before_prepares_input() {
        let shout = Computation::new(from_fn(|text: String| Step::Complete(Ok(text.to_uppercase()))));
        let greeting = shout.before(from_fn(|name: &str| Step::Complete(Ok(format!("hi {name}")))));

        greeting.resume("ada");

        assert_eq!(greeting.result().as_deref(), Some("HI ADA"));
    }

    #[test]
    fn test_interrupting_sequence_interrupts_operand_in_flight() {
        let released = Rc::new(Cell::new(false));
        let slow: Computation<(), u32> = Computation::new(routine({
            let released = Rc::clone(&released);
            move |scope: &mut Scope<()>, (): ()| {
                let released = Rc::clone(&released);
                scope.defer(move || released.set(true));
                Step::Yielded(Suspend::Park)
            }
        }));
        let chained = slow.then(from_fn(|n: u32| Step::Complete(Ok(n))));

        chained.resume(());
        assert!(chained.interrupt().is_none());

        assert_eq!(slow.status(), Status::Interrupted);
        assert!(released.get());
    }
}
