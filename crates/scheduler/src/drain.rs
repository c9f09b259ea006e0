use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::task::lock;

static NEXT_SCHEDULER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Scheduler whose worker pool this thread belongs to.
    static WORKER_OF: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Process-unique id for a new scheduler instance.
pub(crate) fn next_scheduler_id() -> u64 {
    NEXT_SCHEDULER.fetch_add(1, Ordering::Relaxed)
}

/// Mark the current thread as a worker of scheduler `scheduler`.
pub(crate) fn enter_worker(scheduler: u64) {
    WORKER_OF.with(|owner| owner.set(Some(scheduler)));
}

/// Whether the current thread is a worker of scheduler `scheduler`.
/// Draining from one of its own workers would wait on the running task;
/// a worker of another scheduler may drain freely.
pub(crate) fn on_worker_of(scheduler: u64) -> bool {
    WORKER_OF.with(|owner| owner.get() == Some(scheduler))
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    submitted: u64,
    completed: u64,
}

/// Condition variable over the submitted / completed task counters.
#[derive(Debug, Default)]
pub(crate) struct DrainBarrier {
    counts: Mutex<Counts>,
    condvar: Condvar,
}

impl DrainBarrier {
    pub fn task_submitted(&self) {
        lock(&self.counts).submitted += 1;
    }

    pub fn task_completed(&self) {
        let mut counts = lock(&self.counts);
        counts.completed += 1;
        if counts.completed == counts.submitted {
            self.condvar.notify_all();
        }
    }

    /// Block until every task submitted so far, and any submitted while
    /// waiting, has completed.
    pub fn wait(&self) {
        let mut counts = lock(&self.counts);
        while counts.completed < counts.submitted {
            counts = self
                .condvar
                .wait(counts)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    pub fn submitted(&self) -> u64 {
        lock(&self.counts).submitted
    }

    pub fn completed(&self) -> u64 {
        lock(&self.counts).completed
    }

    pub fn outstanding(&self) -> u64 {
        let counts = lock(&self.counts);
        counts.submitted - counts.completed
    }
}
