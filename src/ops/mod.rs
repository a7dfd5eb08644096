//! Ready-made operations.
//!
//! Each operation takes the [`Runtime`](crate::runtime::Runtime) it schedules
//! onto. Every callback an operation schedules is held by a
//! [`TimerGuard`](crate::runtime::TimerGuard) inside the operation's own
//! coroutine, so interrupting the performer cancels whatever has not fired yet.

mod fork;
mod halt;
mod resume;
mod timeout;

pub use fork::fork;
pub use halt::halt;
pub use resume::{resume, Resumable};
pub use timeout::timeout;

use crate::{
    coroutine::{Coroutine, Progress},
    runtime::TimerGuard,
    step::Step,
    suspend::Suspend,
};

/// An operation parked on its scheduled callbacks.
struct Armed {
    guards: Vec<TimerGuard>,
}

impl Armed {
    fn new(guards: Vec<TimerGuard>) -> Self {
        Armed { guards }
    }
}

impl Coroutine for Armed {
    type Resume = ();
    type Return = ();

    fn resume(&mut self, (): ()) -> Progress<(), ()> {
        Step::Complete(Ok(()))
    }

    fn force_return(&mut self) -> Step<Suspend<()>, ()> {
        self.guards.clear();
        Step::Complete(())
    }
}
