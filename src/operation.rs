use std::{fmt, rc::Rc};

use crate::{
    computation::Computation,
    coroutine::{Coroutine, Started},
    suspend::Continuation,
};

/// A stateless effect descriptor.
///
/// An operation is a block that receives the continuation of the coroutine
/// performing it. It does nothing by itself: every time a coroutine performs it,
/// a fresh [`Computation`] is made from the block and driven with that
/// coroutine's continuation. The operation resumes the performer by calling
/// [`Continuation::resume`], or fails it with [`Continuation::fail`] or by
/// failing itself.
///
/// ```rust
/// use strand::{build::from_fn, BoxCoroutine, Computation, Continuation, Operation, Started, Step, Suspend};
///
/// let answer = Operation::new(|k: Continuation<u32>| -> Started<BoxCoroutine<(), ()>> {
///     k.resume(42);
///     Step::Complete(Ok(()))
/// });
///
/// let asker = Computation::new(from_fn(move |n: u32| {
///     if n == 0 {
///         Step::Yielded(Suspend::perform(answer.clone()))
///     } else {
///         Step::Complete(Ok(n))
///     }
/// }));
/// asker.resume(0);
/// assert_eq!(asker.result(), Some(42));
/// ```
pub struct Operation<T> {
    make: Rc<dyn Fn() -> Computation<Continuation<T>, ()>>,
}

impl<T: 'static> Operation<T> {
    pub fn new<C, F>(block: F) -> Self
    where
        F: Fn(Continuation<T>) -> Started<C> + 'static,
        C: Coroutine<Return = ()> + 'static,
        C::Resume: 'static,
    {
        let block = Rc::new(block);
        Operation {
            make: Rc::new(move || {
                let block = Rc::clone(&block);
                Computation::new(move |k: Continuation<T>| block(k))
            }),
        }
    }

    /// A new, unstarted computation running this operation.
    pub fn computation(&self) -> Computation<Continuation<T>, ()> {
        (self.make)()
    }
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Operation {
            make: Rc::clone(&self.make),
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Operation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        build::from_fn,
        computation::Status,
        coroutine::{BoxCoroutine, Progress},
        error::Error,
        ops::testing::performing,
        step::Step,
        suspend::Suspend,
    };
    use std::cell::{Cell, RefCell};

    type Made = Rc<RefCell<Vec<Computation<Continuation<u32>, ()>>>>;

    /// Keeps every computation `op` makes, so its status can be checked afterwards.
    fn recorded(op: Operation<u32>) -> (Operation<u32>, Made) {
        let made: Made = Rc::default();
        let recorded = Operation {
            make: Rc::new({
                let made = Rc::clone(&made);
                move || {
                    let computation = op.computation();
                    made.borrow_mut().push(computation.clone());
                    computation
                }
            }),
        };
        (recorded, made)
    }

    /// Resumes the performer with `value`, if any, then parks.
    fn parks_after(value: Option<u32>) -> Operation<u32> {
        Operation::new(move |k: Continuation<u32>| {
            if let Some(value) = value {
                k.resume(value);
            }
            from_fn(|(): ()| -> Progress<(), ()> { Step::Yielded(Suspend::Park) })(())
        })
    }

    fn immediate(value: u32) -> Operation<u32> {
        Operation::new(move |k: Continuation<u32>| -> Started<BoxCoroutine<(), ()>> {
            k.resume(value);
            Step::Complete(Ok(()))
        })
    }

    #[test]
    fn test_every_perform_gets_a_fresh_computation() {
        let op = immediate(1);
        let a = op.computation();
        let b = op.clone().computation();

        assert_ne!(a.id(), b.id());
        assert!(!a.is_started());
    }

    #[test]
    fn test_operation_is_rerunnable() {
        let runs = Rc::new(Cell::new(0));
        let op = Operation::new({
            let runs = Rc::clone(&runs);
            move |k: Continuation<u32>| -> Started<BoxCoroutine<(), ()>> {
                runs.set(runs.get() + 1);
                k.resume(runs.get());
                Step::Complete(Ok(()))
            }
        });

        let performer = |op: Operation<u32>| {
            Computation::new(from_fn(move |n: u32| {
                if n == 0 {
                    Step::Yielded(Suspend::perform(op.clone()))
                } else {
                    Step::Complete(Ok(n))
                }
            }))
        };
        let first = performer(op.clone());
        let second = performer(op);
        first.resume(0);
        second.resume(0);

        assert_eq!(first.result(), Some(1));
        assert_eq!(second.result(), Some(2));
    }

    #[test]
    fn test_failing_operation_fails_performer() {
        let op = Operation::new(|_k: Continuation<u32>| -> Started<BoxCoroutine<(), ()>> {
            Step::Complete(Err(Error::msg("no effect today")))
        });
        let performer: Computation<(), u32> = Computation::new(from_fn(move |(): ()| {
            Step::Yielded(Suspend::perform_map(op.clone(), |_: u32| ()))
        }));

        performer.resume(());

        assert_eq!(performer.status(), Status::Failed);
        assert_eq!(performer.error().unwrap().to_string(), "no effect today");
    }

    #[test]
    fn test_operation_that_resumed_its_performer_succeeds() {
        let (op, made) = recorded(parks_after(Some(7)));
        let performer = performing(op);

        performer.resume(None);

        assert_eq!(performer.result(), Some(7));
        assert_eq!(made.borrow()[0].status(), Status::Succeeded);
    }

    #[test]
    fn test_interrupting_performer_interrupts_operation() {
        let (op, made) = recorded(parks_after(None));
        let performer = performing(op);

        performer.resume(None);
        assert_eq!(made.borrow()[0].status(), Status::Pending);

        performer.interrupt();
        assert_eq!(made.borrow()[0].status(), Status::Interrupted);
    }
}
