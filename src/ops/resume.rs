use std::time::Duration;

use crate::{
    computation::Computation,
    operation::Operation,
    runtime::Runtime,
    step::Step,
    suspend::{Continuation, Suspend},
};

use super::Armed;

/// Something an operation can resume.
pub trait Resumable<T> {
    fn resume_with(&self, input: T);
}

impl<T: 'static, R: 'static> Resumable<T> for Computation<T, R> {
    fn resume_with(&self, input: T) {
        self.resume(input);
    }
}

impl<T: 'static> Resumable<T> for Continuation<T> {
    fn resume_with(&self, input: T) {
        self.resume(input);
    }
}

/// Resume `target` with `input` on the next tick, and the performer right after it.
///
/// Neither happens synchronously, so a long sequence of these never grows the
/// stack. Interrupting the performer first cancels both.
pub fn resume<T, P>(rt: &Runtime, target: P, input: T) -> Operation<()>
where
    T: Clone + 'static,
    P: Resumable<T> + Clone + 'static,
{
    let rt = rt.clone();
    Operation::new(move |k: Continuation<()>| {
        let target = target.clone();
        let input = input.clone();
        let guards = vec![
            rt.schedule(Duration::ZERO, move || target.resume_with(input)),
            rt.schedule(Duration::ZERO, move || k.resume(())),
        ];
        Step::Yielded((Suspend::Park, Armed::new(guards)))
    })
}
