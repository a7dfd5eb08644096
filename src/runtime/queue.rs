use std::{
    cell::RefCell,
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    fmt,
    rc::Rc,
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use super::{Runtime, Scheduler, TimerId};

/// How a [`TaskQueue`] measures time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    /// Time only moves when the queue runs a task that is due later, or on
    /// [`TaskQueue::advance`]. Nothing ever sleeps.
    #[default]
    Virtual,
    /// Wall-clock time; the queue sleeps until the next task is due.
    Real,
}

/// Task queue configuration.
#[derive(Debug, Clone, Default)]
pub struct TaskQueueConfig {
    pub clock: Clock,
    /// Upper bound on tasks run by a single [`TaskQueue::run_until_idle`] call.
    pub max_tasks: Option<usize>,
}

impl TaskQueueConfig {
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }
}

type Task = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due: Duration,
    seq: u64,
    id: TimerId,
}

struct State {
    now: Duration,
    next_id: u64,
    heap: BinaryHeap<Reverse<Entry>>,
    // Cancelling removes the task here; its heap entry is skipped when reached,
    // or dropped earlier by `compact`.
    tasks: HashMap<TimerId, Task>,
}

/// Cancelled entries tolerated in the heap before it is rebuilt.
const COMPACT_SLACK: usize = 64;

impl State {
    /// Drop cancelled entries sitting at the top of the heap.
    fn next_live(&mut self) -> Option<Entry> {
        while let Some(Reverse(entry)) = self.heap.peek().copied() {
            if self.tasks.contains_key(&entry.id) {
                return Some(entry);
            }
            self.heap.pop();
        }
        None
    }

    /// Drop cancelled entries once they outnumber the live ones.
    fn compact(&mut self) {
        let State { heap, tasks, .. } = self;
        if heap.len() > 2 * tasks.len() + COMPACT_SLACK {
            let before = heap.len();
            heap.retain(|Reverse(entry)| tasks.contains_key(&entry.id));
            trace!(dropped = before - heap.len(), "compacted task heap");
        }
    }
}

struct Inner {
    config: TaskQueueConfig,
    origin: Instant,
    state: RefCell<State>,
}

impl Inner {
    fn elapsed(&self) -> Duration {
        match self.config.clock {
            Clock::Virtual => self.state.borrow().now,
            Clock::Real => self.origin.elapsed(),
        }
    }
}

impl Scheduler for Inner {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let due = self.elapsed() + delay;
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TimerId::new(state.next_id);
        state.heap.push(Reverse(Entry {
            due,
            seq: id.get(),
            id,
        }));
        state.tasks.insert(id, task);
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.borrow_mut();
        let cancelled = state.tasks.remove(&id).is_some();
        if cancelled {
            state.compact();
        }
        cancelled
    }

    fn now(&self) -> Duration {
        self.elapsed()
    }
}

/// A deterministic single-threaded task queue.
///
/// Tasks run one at a time, ordered by due time and then by the order they
/// were scheduled. A running task may schedule or cancel others; the queue is
/// never borrowed while a task runs.
///
/// ```rust
/// use std::{cell::RefCell, rc::Rc, time::Duration};
/// use strand::runtime::TaskQueue;
///
/// let queue = TaskQueue::new();
/// let rt = queue.runtime();
/// let order = Rc::new(RefCell::new(Vec::new()));
///
/// for (delay, name) in [(20, "late"), (0, "first"), (0, "second")] {
///     let order = Rc::clone(&order);
///     rt.schedule(Duration::from_millis(delay), move || order.borrow_mut().push(name))
///         .detach();
/// }
///
/// assert_eq!(queue.run_until_idle(), 3);
/// assert_eq!(*order.borrow(), vec!["first", "second", "late"]);
/// assert_eq!(queue.now(), Duration::from_millis(20));
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    inner: Rc<Inner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        TaskQueue::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue::with_config(TaskQueueConfig::default())
    }

    pub fn with_config(config: TaskQueueConfig) -> Self {
        TaskQueue {
            inner: Rc::new(Inner {
                config,
                origin: Instant::now(),
                state: RefCell::new(State {
                    now: Duration::ZERO,
                    next_id: 0,
                    heap: BinaryHeap::new(),
                    tasks: HashMap::new(),
                }),
            }),
        }
    }

    /// A runtime handle scheduling onto this queue.
    pub fn runtime(&self) -> Runtime {
        let scheduler: Rc<dyn Scheduler> = self.inner.clone();
        Runtime::new(scheduler)
    }

    pub fn config(&self) -> &TaskQueueConfig {
        &self.inner.config
    }

    pub fn now(&self) -> Duration {
        self.inner.elapsed()
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.state.borrow().tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Run the next task, moving the clock forward to its due time if needed.
    ///
    /// Returns `false` when there was nothing to run.
    pub fn tick(&self) -> bool {
        let Some(next) = self.inner.state.borrow_mut().next_live() else {
            return false;
        };
        if self.inner.config.clock == Clock::Real {
            let elapsed = self.inner.origin.elapsed();
            if next.due > elapsed {
                std::thread::sleep(next.due - elapsed);
            }
        }
        self.run_entry(next);
        true
    }

    /// Run tasks until none are left, including tasks scheduled along the way.
    ///
    /// Returns the number of tasks that ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            if let Some(max) = self.inner.config.max_tasks {
                if ran >= max {
                    warn!(max, pending = self.pending(), "task limit reached, queue not idle");
                    break;
                }
            }
            if !self.tick() {
                break;
            }
            ran += 1;
        }
        debug!(ran, now = ?self.now(), "queue idle");
        ran
    }

    /// Move the clock forward by `by`, running every task that falls due.
    ///
    /// Returns the number of tasks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;
        loop {
            let next = self.inner.state.borrow_mut().next_live();
            match next {
                Some(entry) if entry.due <= target => {
                    if self.inner.config.clock == Clock::Real {
                        let elapsed = self.inner.origin.elapsed();
                        if entry.due > elapsed {
                            std::thread::sleep(entry.due - elapsed);
                        }
                    }
                    self.run_entry(entry);
                    ran += 1;
                }
                _ => break,
            }
        }
        match self.inner.config.clock {
            Clock::Virtual => {
                let mut state = self.inner.state.borrow_mut();
                state.now = state.now.max(target);
            }
            Clock::Real => {
                let elapsed = self.inner.origin.elapsed();
                if target > elapsed {
                    std::thread::sleep(target - elapsed);
                }
            }
        }
        ran
    }

    fn run_entry(&self, entry: Entry) {
        let task = {
            let mut state = self.inner.state.borrow_mut();
            state.heap.pop();
            if state.now < entry.due {
                state.now = entry.due;
            }
            state.tasks.remove(&entry.id)
        };
        if let Some(task) = task {
            trace!(timer = %entry.id, due = ?entry.due, "running task");
            task();
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("clock", &self.inner.config.clock)
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce()>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = {
            let seen = Rc::clone(&seen);
            move |n: u32| -> Box<dyn FnOnce()> {
                let seen = Rc::clone(&seen);
                Box::new(move || seen.borrow_mut().push(n))
            }
        };
        (seen, record)
    }

    #[test]
    fn test_orders_by_due_then_fifo() {
        let queue = TaskQueue::new();
        let rt = queue.runtime();
        let (seen, record) = recorder();

        rt.schedule(Duration::from_millis(10), record(3)).detach();
        rt.schedule(Duration::ZERO, record(1)).detach();
        rt.schedule(Duration::from_millis(10), record(4)).detach();
        rt.schedule(Duration::ZERO, record(2)).detach();

        assert_eq!(queue.run_until_idle(), 4);
        assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_tasks_scheduled_while_running_also_run() {
        let queue = TaskQueue::new();
        let rt = queue.runtime();
        let (seen, record) = recorder();

        let inner_rt = rt.clone();
        let later = record(2);
        rt.schedule(Duration::ZERO, move || {
            inner_rt.schedule(Duration::from_millis(1), later).detach();
        })
        .detach();
        rt.schedule(Duration::ZERO, record(1)).detach();

        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_advance_runs_only_due_tasks() {
        let queue = TaskQueue::new();
        let rt = queue.runtime();
        let (seen, record) = recorder();

        rt.schedule(Duration::from_millis(100), record(100)).detach();
        rt.schedule(Duration::from_millis(10), record(10)).detach();

        assert_eq!(queue.advance(Duration::from_millis(50)), 1);
        assert_eq!(queue.now(), Duration::from_millis(50));
        assert_eq!(*seen.borrow(), vec![10]);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_cancelled_tasks_are_skipped() {
        let queue = TaskQueue::new();
        let rt = queue.runtime();
        let (seen, record) = recorder();

        let cancelled = rt.schedule(Duration::ZERO, record(1));
        rt.schedule(Duration::ZERO, record(2)).detach();
        drop(cancelled);

        assert!(queue.tick());
        assert!(!queue.tick());
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn test_max_tasks_bounds_a_run() {
        let queue = TaskQueue::with_config(TaskQueueConfig::default().with_max_tasks(2));
        let rt = queue.runtime();
        let (_seen, record) = recorder();
        for n in 0..5 {
            rt.schedule(Duration::ZERO, record(n)).detach();
        }

        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(queue.pending(), 3);
    }

    #[test]
    fn test_real_clock_waits_for_due_time() {
        let queue = TaskQueue::with_config(TaskQueueConfig::default().with_clock(Clock::Real));
        let rt = queue.runtime();
        let (seen, record) = recorder();

        rt.schedule(Duration::from_millis(5), record(1)).detach();
        queue.run_until_idle();

        assert_eq!(*seen.borrow(), vec![1]);
        assert!(queue.now() >= Duration::from_millis(5));
    }

    #[test]
    fn test_cancelled_far_future_tasks_do_not_pile_up() {
        let queue = TaskQueue::new();
        let rt = queue.runtime();
        let (_seen, record) = recorder();

        for n in 0..10_000 {
            drop(rt.schedule(Duration::from_secs(3600), record(n)));
        }
        assert_eq!(queue.pending(), 0);
        assert!(queue.inner.state.borrow().heap.len() <= COMPACT_SLACK + 1);

        rt.schedule(Duration::ZERO, record(1)).detach();
        assert_eq!(queue.run_until_idle(), 1);
        assert!(queue.inner.state.borrow().heap.is_empty());
    }
}
