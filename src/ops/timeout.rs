use std::time::Duration;

use crate::{operation::Operation, runtime::Runtime, step::Step, suspend::{Continuation, Suspend}};

use super::Armed;

/// Suspend the performer for `duration`.
pub fn timeout(rt: &Runtime, duration: Duration) -> Operation<()> {
    let rt = rt.clone();
    Operation::new(move |k: Continuation<()>| {
        let guard = rt.schedule(duration, move || k.resume(()));
        Step::Yielded((Suspend::Park, Armed::new(vec![guard])))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{computation::Status, ops::testing::performing, runtime::TaskQueue};

    #[test]
    fn test_resumes_after_duration() {
        let queue = TaskQueue::new();
        let sleeper = performing(timeout(&queue.runtime(), Duration::from_millis(100)));

        sleeper.resume(None);
        assert_eq!(sleeper.status(), Status::Pending);

        queue.run_until_idle();
        assert_eq!(sleeper.result(), Some(()));
        assert_eq!(queue.now(), Duration::from_millis(100));
    }

    #[test]
    fn test_interrupt_cancels_timer() {
        let queue = TaskQueue::new();
        let sleeper = performing(timeout(&queue.runtime(), Duration::from_millis(100)));
        sleeper.resume(None);
        assert_eq!(queue.pending(), 1);

        queue.advance(Duration::from_millis(10));
        assert!(sleeper.interrupt().is_none());

        assert!(sleeper.is_done());
        assert_eq!(sleeper.status(), Status::Interrupted);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.run_until_idle(), 0);
        assert_eq!(queue.now(), Duration::from_millis(10));
    }
}
