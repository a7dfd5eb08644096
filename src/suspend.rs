//! What a coroutine hands its driver at a suspension point.
//!
//! A suspension either awaits another [`Computation`], performs an
//! [`Operation`], or parks until something else resumes the coroutine through
//! its [`Continuation`].

use std::{cell::RefCell, fmt, rc::Rc};

use tracing::debug;

use crate::{
    computation::{Cancel, Computation, ComputationId, Outcome},
    error::Error,
    operation::Operation,
};

/// The tagged value yielded at every suspension point.
pub enum Suspend<S> {
    /// Await another computation and continue with its outcome.
    Await(Awaiting<S>),
    /// Perform an effect, handing it a continuation for the rest of the coroutine.
    Perform(Effect<S>),
    /// Suspend with no effect attached.
    ///
    /// A parked coroutine advances when its computation is resumed again
    /// with a value of its resume type, and is otherwise left for an
    /// interrupt to tear down.
    Park,
}

impl<S: 'static> Suspend<S> {
    /// Await `computation`, continuing with its result.
    ///
    /// A failure (or interruption) of `computation` fails the awaiting
    /// computation.
    pub fn wait<I>(computation: &Computation<I, S>) -> Self
    where
        I: 'static,
        S: Clone,
    {
        Suspend::Await(Awaiting::new(computation, |linked| linked))
    }

    /// Await `computation` and convert its result into this coroutine's resume type.
    pub fn wait_map<I, T, F>(computation: &Computation<I, T>, f: F) -> Self
    where
        I: 'static,
        T: Clone + 'static,
        F: FnOnce(T) -> S + 'static,
    {
        Suspend::Await(Awaiting::new(computation, move |linked| linked.map(f)))
    }

    /// Await `computation` and decide what its full outcome means here.
    ///
    /// Returning `Err` fails the awaiting computation; returning `Ok` resumes it.
    pub fn wait_with<I, T, F>(computation: &Computation<I, T>, f: F) -> Self
    where
        I: 'static,
        T: Clone + 'static,
        F: FnOnce(Result<T, Error>) -> Result<S, Error> + 'static,
    {
        Suspend::Await(Awaiting::new(computation, f))
    }

    /// Perform `operation`, continuing with the value it resumes us with.
    pub fn perform(operation: Operation<S>) -> Self {
        Suspend::Perform(Effect::new(operation, |value| value))
    }

    /// Perform `operation` and convert its resume value into this coroutine's resume type.
    pub fn perform_map<T, F>(operation: Operation<T>, f: F) -> Self
    where
        T: 'static,
        F: FnOnce(T) -> S + 'static,
    {
        Suspend::Perform(Effect::new(operation, f))
    }

    /// Mark every failure reached through this suspension as a cleanup failure.
    pub(crate) fn into_cleanup(self) -> Self {
        match self {
            Suspend::Await(awaiting) => Suspend::Await(awaiting.map_err(Error::cleanup)),
            Suspend::Perform(effect) => Suspend::Perform(effect.map_err(Error::cleanup)),
            Suspend::Park => Suspend::Park,
        }
    }
}

impl<T: Clone + 'static> Suspend<Result<T, Error>> {
    /// Await `computation`, receiving its failure instead of being failed by it.
    pub fn attempt<I>(computation: &Computation<I, T>) -> Self
    where
        I: 'static,
    {
        Suspend::Await(Awaiting::new(computation, Ok))
    }
}

impl<S> fmt::Debug for Suspend<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspend::Await(awaiting) => f.debug_tuple("Await").field(&awaiting.target).finish(),
            Suspend::Perform(_) => f.write_str("Perform"),
            Suspend::Park => f.write_str("Park"),
        }
    }
}

type Deliver<S> = Box<dyn FnOnce(Result<S, Error>)>;
type Attach<S> = Box<dyn FnOnce(Deliver<S>) -> Box<dyn FnOnce()>>;

/// A link to another computation's outcome.
pub struct Awaiting<S> {
    target: ComputationId,
    attach: Attach<S>,
}

impl<S: 'static> Awaiting<S> {
    fn new<I, T, F>(computation: &Computation<I, T>, map: F) -> Self
    where
        I: 'static,
        T: Clone + 'static,
        F: FnOnce(Result<T, Error>) -> Result<S, Error> + 'static,
    {
        let computation = computation.clone();
        Awaiting {
            target: computation.id(),
            attach: Box::new(move |deliver: Deliver<S>| -> Box<dyn FnOnce()> {
                let subscription =
                    computation.subscribe(move |outcome: &Outcome<T>| deliver(map(outcome.linked())));
                Box::new(move || {
                    computation.unsubscribe(subscription);
                })
            }),
        }
    }

    /// The computation being awaited.
    pub fn target(&self) -> ComputationId {
        self.target
    }

    /// Subscribe `deliver` to the target; the returned closure detaches it again.
    ///
    /// Delivery is synchronous when the target has already settled.
    pub(crate) fn attach(self, deliver: Deliver<S>) -> Box<dyn FnOnce()> {
        (self.attach)(deliver)
    }

    fn map_err(self, f: fn(Error) -> Error) -> Self {
        let attach = self.attach;
        Awaiting {
            target: self.target,
            attach: Box::new(move |deliver: Deliver<S>| -> Box<dyn FnOnce()> {
                attach(Box::new(move |linked: Result<S, Error>| deliver(linked.map_err(f))))
            }),
        }
    }
}

/// An operation ready to be launched on behalf of a suspended coroutine.
pub struct Effect<S> {
    launch: Box<dyn FnOnce(Continuation<S>) -> Launched>,
}

/// A launched operation: the handle that cancels it and the call that starts it.
///
/// Kept apart so the driver can record the handle before the operation runs.
pub(crate) struct Launched {
    pub(crate) handle: Box<dyn Cancel>,
    pub(crate) start: Box<dyn FnOnce()>,
}

impl<S: 'static> Effect<S> {
    fn new<T, F>(operation: Operation<T>, map: F) -> Self
    where
        T: 'static,
        F: FnOnce(T) -> S + 'static,
    {
        Effect {
            launch: Box::new(move |continuation: Continuation<S>| {
                let continuation = continuation.map_input(map);
                let computation = operation.computation();
                let forward = continuation.clone();
                computation.subscribe(move |outcome: &Outcome<()>| {
                    if let Outcome::Failed(error) = outcome {
                        forward.fail(error.clone());
                    }
                });
                let handle: Box<dyn Cancel> = Box::new(computation.clone());
                Launched {
                    handle,
                    start: Box::new(move || computation.resume(continuation)),
                }
            }),
        }
    }

    pub(crate) fn launch(self, continuation: Continuation<S>) -> Launched {
        (self.launch)(continuation)
    }

    fn map_err(self, f: fn(Error) -> Error) -> Self {
        let launch = self.launch;
        Effect {
            launch: Box::new(move |continuation: Continuation<S>| launch(continuation.map_err(f))),
        }
    }
}

type Resumer<T> = Box<dyn FnOnce(Result<T, Error>)>;

/// The rest of a suspended coroutine, as seen by the operation it is performing.
///
/// A continuation is one-shot: the first [`resume`](Continuation::resume) or
/// [`fail`](Continuation::fail) consumes it and every later call is ignored.
/// Clones share the same slot.
pub struct Continuation<T> {
    slot: Rc<RefCell<Option<Resumer<T>>>>,
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Continuation {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: 'static> Continuation<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<T, Error>) + 'static,
    {
        Continuation {
            slot: Rc::new(RefCell::new(Some(Box::new(f)))),
        }
    }

    pub fn resume(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn fail(&self, error: Error) {
        self.settle(Err(error));
    }

    pub fn settle(&self, outcome: Result<T, Error>) {
        let resumer = self.slot.borrow_mut().take();
        match resumer {
            Some(resumer) => resumer(outcome),
            None => debug!("continuation already spent, ignoring"),
        }
    }

    pub fn is_spent(&self) -> bool {
        self.slot.borrow().is_none()
    }

    /// Adapt this continuation to accept a different value.
    pub fn map_input<U, F>(self, f: F) -> Continuation<U>
    where
        U: 'static,
        F: FnOnce(U) -> T + 'static,
    {
        Continuation::new(move |outcome: Result<U, Error>| self.settle(outcome.map(f)))
    }

    fn map_err(self, f: fn(Error) -> Error) -> Self {
        Continuation::new(move |outcome: Result<T, Error>| self.settle(outcome.map_err(f)))
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("spent", &self.slot.borrow().is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_continuation_fires_once() {
        let hits = Rc::new(Cell::new(0));
        let k = Continuation::new({
            let hits = Rc::clone(&hits);
            move |outcome: Result<u32, Error>| {
                assert_eq!(outcome.unwrap(), 7);
                hits.set(hits.get() + 1);
            }
        });
        let twin = k.clone();

        k.resume(7);
        twin.resume(8);
        twin.fail(Error::msg("late"));

        assert_eq!(hits.get(), 1);
        assert!(k.is_spent());
    }

    #[test]
    fn test_map_input_converts_before_resuming() {
        let seen = Rc::new(RefCell::new(None));
        let k = Continuation::new({
            let seen = Rc::clone(&seen);
            move |outcome: Result<String, Error>| *seen.borrow_mut() = Some(outcome.unwrap())
        });

        k.map_input(|n: u32| format!("n={n}")).resume(3);

        assert_eq!(seen.borrow().as_deref(), Some("n=3"));
    }

    #[test]
    fn test_map_err_marks_failures() {
        let seen = Rc::new(RefCell::new(None));
        let k = Continuation::new({
            let seen = Rc::clone(&seen);
            move |outcome: Result<(), Error>| *seen.borrow_mut() = outcome.err()
        });

        k.map_err(Error::cleanup).fail(Error::msg("timer broke"));

        let error = seen.borrow_mut().take().unwrap();
        assert!(error.is_cleanup());
    }

    #[test]
    fn test_attach_to_settled_computation_delivers_immediately() {
        let source = Computation::new(crate::build::done::<(), u32>(5));
        source.resume(());

        let seen = Rc::new(Cell::new(0));
        let awaiting = Awaiting::new(&source, |linked: Result<u32, Error>| linked.map(|n| n + 1));
        assert_eq!(awaiting.target(), source.id());

        let detach = awaiting.attach(Box::new({
            let seen = Rc::clone(&seen);
            move |linked: Result<u32, Error>| seen.set(linked.unwrap())
        }));
        detach();

        assert_eq!(seen.get(), 6);
    }
}
