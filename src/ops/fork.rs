use std::time::Duration;

use crate::{
    computation::Computation,
    operation::Operation,
    runtime::Runtime,
    step::Step,
    suspend::{Continuation, Suspend},
};

use super::Armed;

/// Start a computation alongside the performer.
///
/// `make` builds the child each time the operation is performed. The child is
/// started on the next tick and the performer is resumed with its handle
/// right after, without waiting for the child to finish. The child is not
/// supervised: it outlives the performer unless someone [`halt`](super::halt)s it.
pub fn fork<T, F>(rt: &Runtime, make: F) -> Operation<Computation<(), T>>
where
    T: 'static,
    F: Fn() -> Computation<(), T> + 'static,
{
    let rt = rt.clone();
    Operation::new(move |k: Continuation<Computation<(), T>>| {
        let child = make();
        let starter = child.clone();
        let guards = vec![
            rt.schedule(Duration::ZERO, move || starter.resume(())),
            rt.schedule(Duration::ZERO, move || k.resume(child)),
        ];
        Step::Yielded((Suspend::Park, Armed::new(guards)))
    })
}
