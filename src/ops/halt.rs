use std::time::Duration;

use either::Either;
use tracing::warn;

use crate::{
    computation::Computation,
    coroutine::{Coroutine, Progress},
    operation::Operation,
    runtime::{Runtime, TimerGuard},
    step::Step,
    suspend::{Continuation, Suspend},
};

use super::Armed;

/// Waits for a target's teardown, then resumes the performer on a later tick.
struct Halting {
    rt: Runtime,
    k: Continuation<()>,
    guard: Option<TimerGuard>,
}

impl Coroutine for Halting {
    type Resume = ();
    type Return = ();

    fn resume(&mut self, (): ()) -> Progress<(), ()> {
        let k = self.k.clone();
        self.guard = Some(self.rt.schedule(Duration::ZERO, move || k.resume(())));
        Step::Yielded(Suspend::Park)
    }

    fn force_return(&mut self) -> Step<Suspend<()>, ()> {
        self.guard = None;
        Step::Complete(())
    }
}

/// Interrupt `target` and resume the performer once its teardown is complete.
///
/// If a cleanup section of the target suspends (on a timer, say), the
/// performer stays suspended until that cleanup has run to the end. A failing
/// cleanup is logged; the performer is resumed either way.
pub fn halt<I, R>(rt: &Runtime, target: &Computation<I, R>) -> Operation<()>
where
    I: 'static,
    R: 'static,
{
    let rt = rt.clone();
    let target = target.clone();
    Operation::new(move |k: Continuation<()>| match target.interrupt() {
        None => {
            let guard = rt.schedule(Duration::ZERO, move || k.resume(()));
            Step::Yielded((Suspend::Park, Either::Left(Armed::new(vec![guard]))))
        }
        Some(teardown) => {
            let id = target.id();
            teardown.resume(());
            let suspend = Suspend::wait_with(&teardown, move |result: Result<(), _>| {
                if let Err(error) = result {
                    warn!(computation = %id, error = %error, "teardown failed while halting");
                }
                Ok(())
            });
            let halting = Halting {
                rt: rt.clone(),
                k,
                guard: None,
            };
            Step::Yielded((suspend, Either::Right(halting)))
        }
    })
}
