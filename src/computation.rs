//! The computation driver and its state machine.
//!
//! A [`Computation`] owns one coroutine and drives it: it starts the coroutine on
//! the first [`resume`](Computation::resume), links it to whatever it awaits,
//! launches the operations it performs, and settles exactly once, notifying
//! every subscriber.
//!
//! Settling is terminal. A computation is `Pending` until it becomes
//! `Succeeded`, `Failed` or `Interrupted`, and the outcome never changes after
//! that.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use tracing::{debug, error, trace, warn};

use crate::{
    coroutine::{BoxCoroutine, Coroutine, Progress, Started},
    error::Error,
    step::Step,
    suspend::{Continuation, Suspend},
};

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

/// Identity of a computation, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputationId(u64);

impl ComputationId {
    fn next() -> Self {
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            ComputationId(id)
        })
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a computation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Succeeded,
    Failed,
    Interrupted,
}

impl Status {
    pub const fn is_done(self) -> bool {
        !matches!(self, Status::Pending)
    }
}

/// How a computation settled.
#[derive(Debug, Clone)]
pub enum Outcome<R> {
    Succeeded(R),
    Failed(Error),
    /// Cancelled before it produced a result.
    Interrupted,
}

impl<R> Outcome<R> {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Succeeded(_) => Status::Succeeded,
            Outcome::Failed(_) => Status::Failed,
            Outcome::Interrupted => Status::Interrupted,
        }
    }

    pub fn value(&self) -> Option<&R> {
        match self {
            Outcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Collapse into a `Result`, reporting an interruption as [`Error::Interrupted`].
    pub fn into_result(self) -> Result<R, Error> {
        match self {
            Outcome::Succeeded(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
            Outcome::Interrupted => Err(Error::Interrupted),
        }
    }

    /// What an awaiting computation receives when this outcome is linked to it.
    pub fn linked(&self) -> Result<R, Error>
    where
        R: Clone,
    {
        match self {
            Outcome::Succeeded(value) => Ok(value.clone()),
            Outcome::Failed(error) => Err(error.clone()),
            Outcome::Interrupted => Err(Error::Interrupted),
        }
    }
}

/// Handle to a registered completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Subscriber<R> = Box<dyn FnOnce(&Outcome<R>)>;

/// A running operation, as held by the computation performing it.
pub(crate) trait Cancel {
    /// Interrupt, driving any teardown to the end in the background.
    fn cancel(&self);
    /// The operation resumed its performer: settle it as succeeded and release what it holds.
    fn finish(&self);
}

/// Drive a teardown computation to completion without anyone awaiting it.
pub(crate) fn drive(teardown: Computation<(), ()>) {
    let id = teardown.id();
    teardown.subscribe(move |outcome: &Outcome<()>| {
        if let Outcome::Failed(error) = outcome {
            warn!(computation = %id, error = %error, "background teardown failed");
        }
    });
    teardown.resume(());
}

trait Core<I, R> {
    fn id(&self) -> ComputationId;
    fn start(&self, input: I);
    fn is_started(&self) -> bool;
    fn status(&self) -> Status;
    fn outcome(&self) -> Option<Rc<Outcome<R>>>;
    fn subscribe(&self, callback: Subscriber<R>) -> Subscription;
    fn unsubscribe(&self, subscription: Subscription) -> bool;
    fn interrupt(&self) -> Option<Computation<(), ()>>;
    fn fail(&self, error: Error);
    fn succeed(&self, value: R);
}

/// A stateful driver wrapping exactly one coroutine instance.
///
/// `I` is the input given to the first [`resume`](Computation::resume) and `R` is
/// the result. Handles are cheap to clone and all refer to the same computation.
///
/// ```rust
/// use strand::{build::from_fn, Computation, Status, Step};
///
/// let double = Computation::new(from_fn(|n: u32| Step::Complete(Ok(n * 2))));
/// assert_eq!(double.status(), Status::Pending);
///
/// double.resume(21);
/// assert_eq!(double.result(), Some(42));
/// ```
pub struct Computation<I, R> {
    core: Rc<dyn Core<I, R>>,
}

impl<I, R> Clone for Computation<I, R> {
    fn clone(&self) -> Self {
        Computation {
            core: Rc::clone(&self.core),
        }
    }
}

impl<I: 'static, R: 'static> Computation<I, R> {
    /// Wrap a block. Nothing runs until the first [`resume`](Computation::resume).
    pub fn new<C, F>(block: F) -> Self
    where
        F: FnOnce(I) -> Started<C> + 'static,
        C: Coroutine<Return = R> + 'static,
        C::Resume: 'static,
    {
        let node = Rc::new_cyclic(|me| Node {
            id: ComputationId::next(),
            me: me.clone(),
            state: RefCell::new(State {
                stage: Stage::Created(block),
                pending: None,
                epoch: 0,
                subscribers: Vec::new(),
                next_subscription: 0,
            }),
            _input: PhantomData,
        });
        let core: Rc<dyn Core<I, R>> = node;
        Computation { core }
    }

    pub fn id(&self) -> ComputationId {
        self.core.id()
    }

    /// Start the computation with `input`, or advance it if it is parked.
    ///
    /// The first call starts the coroutine. Later calls advance a coroutine
    /// suspended with [`Suspend::Park`], provided its resume type is `I`. A
    /// computation awaiting or performing something advances only through
    /// that link, and a settled computation ignores every call.
    ///
    /// ```rust
    /// use strand::{build::from_fn, Computation, Step, Suspend};
    ///
    /// let total = Computation::new(from_fn(|n: u32| {
    ///     if n == 0 { Step::Yielded(Suspend::Park) } else { Step::Complete(Ok(n)) }
    /// }));
    /// total.resume(0);
    /// total.resume(5);
    /// assert_eq!(total.result(), Some(5));
    /// ```
    pub fn resume(&self, input: I) {
        self.core.start(input);
    }

    pub fn is_started(&self) -> bool {
        self.core.is_started()
    }

    pub fn status(&self) -> Status {
        self.core.status()
    }

    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    pub fn outcome(&self) -> Option<Rc<Outcome<R>>> {
        self.core.outcome()
    }

    pub fn result(&self) -> Option<R>
    where
        R: Clone,
    {
        self.outcome().and_then(|outcome| outcome.value().cloned())
    }

    pub fn error(&self) -> Option<Error> {
        self.outcome().and_then(|outcome| outcome.error().cloned())
    }

    /// Register a one-shot completion callback.
    ///
    /// If the computation has already settled the callback runs before this
    /// returns; otherwise it runs when the computation settles.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce(&Outcome<R>) + 'static,
    {
        self.core.subscribe(Box::new(callback))
    }

    /// Remove a callback that has not fired yet. Returns whether it was removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.core.unsubscribe(subscription)
    }

    /// Settle the computation as interrupted and tear its coroutine down.
    ///
    /// Subscribers fire before this returns. If a cleanup section of the
    /// coroutine suspends, the rest of the teardown is returned as a new
    /// computation that the caller must resume to release what remains.
    pub fn interrupt(&self) -> Option<Computation<(), ()>> {
        self.core.interrupt()
    }

    /// Settle the computation as failed with `error` and tear its coroutine down.
    pub fn fail(&self, error: Error) {
        self.core.fail(error);
    }
}

impl<T: 'static> Computation<T, T> {
    /// A computation whose result is its input.
    pub fn identity() -> Self {
        Computation::new(|input: T| -> Started<BoxCoroutine<(), T>> { Step::Complete(Ok(input)) })
    }
}

impl<I: 'static> Cancel for Computation<I, ()> {
    fn cancel(&self) {
        if let Some(teardown) = self.interrupt() {
            drive(teardown);
        }
    }

    fn finish(&self) {
        self.core.succeed(());
    }
}

impl<I, R> fmt::Debug for Computation<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.core.id())
            .field("status", &self.core.status())
            .finish()
    }
}

struct Node<I, C: Coroutine, F> {
    id: ComputationId,
    me: Weak<Self>,
    state: RefCell<State<C, F>>,
    _input: PhantomData<fn(I)>,
}

struct State<C: Coroutine, F> {
    stage: Stage<C, F>,
    pending: Option<Pending>,
    // Bumped at every suspension; links and continuations carry the epoch they were made for.
    epoch: u64,
    subscribers: Vec<(u64, Subscriber<C::Return>)>,
    next_subscription: u64,
}

enum Stage<C: Coroutine, F> {
    Created(F),
    // `None` while the coroutine itself is executing.
    Running(Option<C>),
    Settled(Rc<Outcome<C::Return>>),
}

/// What the current suspension point is waiting on.
enum Pending {
    Awaiting(Box<dyn FnOnce()>),
    Performing(Box<dyn Cancel>),
}

impl Pending {
    /// The suspension was cut short.
    fn release(self) {
        match self {
            Pending::Awaiting(detach) => detach(),
            Pending::Performing(operation) => operation.cancel(),
        }
    }

    /// The suspension delivered a value and the coroutine is moving on.
    fn complete(self) {
        match self {
            Pending::Awaiting(detach) => detach(),
            Pending::Performing(operation) => operation.finish(),
        }
    }
}

impl<I, C, F> Node<I, C, F>
where
    I: 'static,
    C: Coroutine + 'static,
    C::Resume: 'static,
    C::Return: 'static,
    F: FnOnce(I) -> Started<C> + 'static,
{
    fn begin(&self, input: I) {
        let block = {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut state.stage, Stage::Running(None)) {
                Stage::Created(block) => Some(block),
                other => {
                    state.stage = other;
                    None
                }
            }
        };
        let Some(block) = block else {
            debug!(computation = %self.id, "resume ignored, computation already started");
            return;
        };

        trace!(computation = %self.id, "started");
        match block(input) {
            Step::Yielded((suspend, coroutine)) => self.suspend(coroutine, suspend),
            Step::Complete(result) => self.complete(result),
        }
    }

    /// Advance a coroutine parked with nothing pending, if `input` is what it resumes with.
    fn resume_parked(&self, input: I) {
        let input: Box<dyn Any> = Box::new(input);
        match input.downcast::<C::Resume>() {
            Ok(input) => {
                trace!(computation = %self.id, "resuming parked coroutine");
                self.advance(*input);
            }
            Err(_) => {
                debug!(computation = %self.id, "resume ignored, parked coroutine resumes with another type");
            }
        }
    }

    fn advance(&self, input: C::Resume) {
        let taken = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            match &mut state.stage {
                Stage::Running(slot) => slot.take().map(|coroutine| (coroutine, state.pending.take())),
                Stage::Created(_) | Stage::Settled(_) => None,
            }
        };
        let Some((mut coroutine, pending)) = taken else {
            debug!(computation = %self.id, "resumption ignored, computation is not suspended");
            return;
        };
        if let Some(pending) = pending {
            pending.complete();
        }

        match coroutine.resume(input) {
            Step::Yielded(suspend) => self.suspend(coroutine, suspend),
            Step::Complete(result) => self.complete(result),
        }
    }

    fn suspend(&self, coroutine: C, suspend: Suspend<C::Resume>) {
        let parked = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if let Stage::Running(slot) = &mut state.stage {
                *slot = Some(coroutine);
                state.epoch += 1;
                Ok(state.epoch)
            } else {
                Err(coroutine)
            }
        };
        let epoch = match parked {
            Ok(epoch) => epoch,
            Err(coroutine) => return self.orphan(coroutine),
        };
        let Some(this) = self.me.upgrade() else {
            return;
        };

        match suspend {
            Suspend::Park => {
                trace!(computation = %self.id, "parked");
            }
            Suspend::Await(awaiting) => {
                trace!(computation = %self.id, target = %awaiting.target(), "awaiting");
                let detach = awaiting.attach(Box::new(move |linked| this.link(epoch, linked)));
                self.hold(epoch, Pending::Awaiting(detach));
            }
            Suspend::Perform(effect) => {
                trace!(computation = %self.id, "performing");
                let continuation = Continuation::new(move |linked| this.link(epoch, linked));
                let launched = effect.launch(continuation);
                self.hold(epoch, Pending::Performing(launched.handle));
                (launched.start)();
            }
        }
    }

    /// Record what the suspension at `epoch` waits on, unless it is already over.
    fn hold(&self, epoch: u64, pending: Pending) {
        let stale = {
            let mut state = self.state.borrow_mut();
            if state.epoch == epoch && matches!(&state.stage, Stage::Running(Some(_))) {
                state.pending = Some(pending);
                None
            } else {
                Some(pending)
            }
        };
        if let Some(pending) = stale {
            pending.release();
        }
    }

    fn link(&self, epoch: u64, linked: Result<C::Resume, Error>) {
        let current = {
            let state = self.state.borrow();
            state.epoch == epoch && matches!(&state.stage, Stage::Running(Some(_)))
        };
        if !current {
            debug!(computation = %self.id, epoch, "stale resumption ignored");
            return;
        }
        match linked {
            Ok(value) => self.advance(value),
            Err(error) => self.fail_with(error),
        }
    }

    fn complete(&self, result: Result<C::Return, Error>) {
        let outcome = match result {
            Ok(value) => Outcome::Succeeded(value),
            Err(error) => Outcome::Failed(error),
        };
        if self.finalize(outcome).is_none() {
            debug!(computation = %self.id, "completion discarded, computation already settled");
        }
    }

    /// Settle and notify. Returns the coroutine that still needs tearing down,
    /// or `None` if the computation had already settled.
    fn finalize(&self, outcome: Outcome<C::Return>) -> Option<Option<C>> {
        let (coroutine, pending, subscribers, outcome) = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if matches!(&state.stage, Stage::Settled(_)) {
                return None;
            }
            let outcome = Rc::new(outcome);
            let coroutine = match std::mem::replace(&mut state.stage, Stage::Settled(Rc::clone(&outcome))) {
                Stage::Running(coroutine) => coroutine,
                Stage::Created(_) | Stage::Settled(_) => None,
            };
            (
                coroutine,
                state.pending.take(),
                std::mem::take(&mut state.subscribers),
                outcome,
            )
        };

        match outcome.as_ref() {
            Outcome::Failed(failure) if subscribers.is_empty() => {
                error!(computation = %self.id, error = %failure, "computation failed with no subscriber");
            }
            other => trace!(computation = %self.id, status = ?other.status(), "settled"),
        }
        for (_, subscriber) in subscribers {
            subscriber(&outcome);
        }
        if let Some(pending) = pending {
            pending.release();
        }
        Some(coroutine)
    }

    fn fail_with(&self, error: Error) {
        self.settle_with(Outcome::Failed(error));
    }

    /// Settle from outside the coroutine and tear it down in the background.
    fn settle_with(&self, outcome: Outcome<C::Return>) {
        if let Some(Some(coroutine)) = self.finalize(outcome) {
            if let Some(teardown) = teardown(self.id, coroutine) {
                drive(teardown);
            }
        }
    }

    /// The computation settled while its coroutine was executing.
    fn orphan(&self, coroutine: C) {
        debug!(computation = %self.id, "settled while running, tearing down");
        if let Some(teardown) = teardown(self.id, coroutine) {
            drive(teardown);
        }
    }
}

impl<I, C, F> Core<I, C::Return> for Node<I, C, F>
where
    I: 'static,
    C: Coroutine + 'static,
    C::Resume: 'static,
    C::Return: 'static,
    F: FnOnce(I) -> Started<C> + 'static,
{
    fn id(&self) -> ComputationId {
        self.id
    }

    fn start(&self, input: I) {
        let parked = {
            let state = self.state.borrow();
            matches!(&state.stage, Stage::Running(Some(_))) && state.pending.is_none()
        };
        if parked {
            self.resume_parked(input);
        } else {
            self.begin(input);
        }
    }

    fn is_started(&self) -> bool {
        !matches!(&self.state.borrow().stage, Stage::Created(_))
    }

    fn status(&self) -> Status {
        match &self.state.borrow().stage {
            Stage::Created(_) | Stage::Running(_) => Status::Pending,
            Stage::Settled(outcome) => outcome.status(),
        }
    }

    fn outcome(&self) -> Option<Rc<Outcome<C::Return>>> {
        match &self.state.borrow().stage {
            Stage::Settled(outcome) => Some(Rc::clone(outcome)),
            Stage::Created(_) | Stage::Running(_) => None,
        }
    }

    fn subscribe(&self, callback: Subscriber<C::Return>) -> Subscription {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.next_subscription += 1;
        let subscription = Subscription(state.next_subscription);
        let settled = match &state.stage {
            Stage::Settled(outcome) => Some(Rc::clone(outcome)),
            Stage::Created(_) | Stage::Running(_) => None,
        };
        match settled {
            Some(outcome) => {
                drop(guard);
                callback(&outcome);
            }
            None => state.subscribers.push((subscription.0, callback)),
        }
        subscription
    }

    fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.subscribers.len();
        state.subscribers.retain(|(id, _)| *id != subscription.0);
        state.subscribers.len() != before
    }

    fn interrupt(&self) -> Option<Computation<(), ()>> {
        match self.finalize(Outcome::Interrupted) {
            None => {
                trace!(computation = %self.id, "interrupt ignored, computation already settled");
                None
            }
            Some(None) => None,
            Some(Some(coroutine)) => teardown(self.id, coroutine),
        }
    }

    fn fail(&self, error: Error) {
        self.fail_with(error);
    }

    fn succeed(&self, value: C::Return) {
        self.settle_with(Outcome::Succeeded(value));
    }
}

/// Force-return `coroutine`; if a cleanup section suspends, wrap the rest as a computation.
fn teardown<C>(owner: ComputationId, mut coroutine: C) -> Option<Computation<(), ()>>
where
    C: Coroutine + 'static,
    C::Resume: 'static,
{
    match coroutine.force_return() {
        Step::Complete(()) => None,
        Step::Yielded(suspend) => {
            debug!(computation = %owner, "teardown suspended in a cleanup section");
            let first = suspend.into_cleanup();
            // Boxed so that tearing down the teardown itself stays at `Unwinding<C::Resume>`.
            let unwind: Unwind<C::Resume> = Box::new(move |input| coroutine.unwind(input));
            Some(Computation::new(move |(): ()| {
                Step::Yielded((first, Unwinding { owner, unwind }))
            }))
        }
    }
}

type Unwind<S> = Box<dyn FnMut(S) -> Step<Suspend<S>, ()>>;

/// Remaining teardown of a coroutine whose cleanup section suspended.
struct Unwinding<S> {
    owner: ComputationId,
    unwind: Unwind<S>,
}

impl<S: 'static> Coroutine for Unwinding<S> {
    type Resume = S;
    type Return = ();

    fn resume(&mut self, input: S) -> Progress<S, ()> {
        match (self.unwind)(input) {
            Step::Yielded(suspend) => Step::Yielded(suspend.into_cleanup()),
            Step::Complete(()) => {
                trace!(computation = %self.owner, "teardown finished");
                Step::Complete(Ok(()))
            }
        }
    }

    fn force_return(&mut self) -> Step<Suspend<S>, ()> {
        warn!(computation = %self.owner, "teardown interrupted, remaining cleanup abandoned");
        Step::Complete(())
    }
}
