//! The injected scheduler capability.
//!
//! Primitive operations never reach for an ambient timer: they are given a
//! [`Runtime`], a handle to some [`Scheduler`]. [`TaskQueue`] is the scheduler
//! this crate ships; it runs on a virtual clock by default, which makes every
//! interleaving reproducible in tests.

mod queue;

use std::{fmt, rc::Rc, time::Duration};

use tracing::trace;

pub use queue::{Clock, TaskQueue, TaskQueueConfig};

/// Identifies a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub const fn new(raw: u64) -> Self {
        TimerId(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// A deferred-callback scheduler.
///
/// Callbacks scheduled for the same instant run in the order they were
/// scheduled. A cancelled callback never runs.
pub trait Scheduler {
    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId;

    /// Cancel a pending callback. Returns `false` if it already ran or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;

    /// Time elapsed on this scheduler's clock.
    fn now(&self) -> Duration;
}

/// Cheap, cloneable handle to a [`Scheduler`].
#[derive(Clone)]
pub struct Runtime {
    scheduler: Rc<dyn Scheduler>,
}

impl Runtime {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Runtime { scheduler }
    }

    /// Schedule `task`; it is cancelled again when the returned guard is dropped.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerGuard
    where
        F: FnOnce() + 'static,
    {
        let id = self.scheduler.schedule(delay, Box::new(task));
        trace!(timer = %id, ?delay, "scheduled");
        TimerGuard {
            id,
            scheduler: Some(Rc::clone(&self.scheduler)),
        }
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").field("now", &self.now()).finish()
    }
}

/// Scoped ownership of a scheduled callback.
///
/// Dropping the guard cancels the callback if it has not run yet.
#[must_use = "dropping a TimerGuard cancels the timer"]
pub struct TimerGuard {
    id: TimerId,
    scheduler: Option<Rc<dyn Scheduler>>,
}

impl TimerGuard {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Let the callback run regardless of this guard.
    pub fn detach(mut self) -> TimerId {
        self.scheduler = None;
        self.id
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            if scheduler.cancel(self.id) {
                trace!(timer = %self.id, "cancelled");
            }
        }
    }
}

impl fmt::Debug for TimerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerGuard")
            .field("id", &self.id)
            .field("detached", &self.scheduler.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_dropping_guard_cancels() {
        let queue = TaskQueue::new();
        let rt = queue.runtime();
        let fired = Rc::new(Cell::new(false));

        let guard = rt.schedule(Duration::from_millis(5), {
            let fired = Rc::clone(&fired);
            move || fired.set(true)
        });
        assert_eq!(queue.pending(), 1);
        drop(guard);

        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.run_until_idle(), 0);
        assert!(!fired.get());
    }

    #[test]
    fn test_detached_guard_still_fires() {
        let queue = TaskQueue::new();
        let rt = queue.runtime();
        let fired = Rc::new(Cell::new(false));

        let id = rt
            .schedule(Duration::ZERO, {
                let fired = Rc::clone(&fired);
                move || fired.set(true)
            })
            .detach();

        assert_eq!(queue.run_until_idle(), 1);
        assert!(fired.get());
        assert_eq!(id.to_string(), format!("timer-{}", id.get()));
    }
}
