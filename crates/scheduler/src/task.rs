use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tessera_core::{Access, TaskId};

use crate::kernel::Kernel;

/// Lifecycle of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    /// Waiting on at least one predecessor.
    Pending = 0,
    /// Queued for a worker.
    Ready = 1,
    /// Executing on a worker.
    Running = 2,
    /// Finished, successors notified.
    Completed = 3,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Pending,
            1 => TaskState::Ready,
            2 => TaskState::Running,
            _ => TaskState::Completed,
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Links {
    completed: bool,
    successors: Vec<TaskId>,
}

/// Scheduler-owned record of one submitted task.
pub(crate) struct TaskNode {
    pub id: TaskId,
    pub kernel_name: String,
    pub accesses: Vec<Access>,
    kernel: Mutex<Option<Box<dyn Kernel>>>,
    /// Outstanding predecessors, plus one admission guard held until the
    /// submitter has linked every edge.
    pending: AtomicUsize,
    state: AtomicU8,
    links: Mutex<Links>,
}

impl TaskNode {
    pub fn new(id: TaskId, kernel: Box<dyn Kernel>, accesses: Vec<Access>) -> Self {
        Self {
            id,
            kernel_name: kernel.name().to_string(),
            accesses,
            kernel: Mutex::new(Some(kernel)),
            pending: AtomicUsize::new(1),
            state: AtomicU8::new(TaskState::Pending as u8),
            links: Mutex::new(Links {
                completed: false,
                successors: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.links).completed
    }

    /// Count one more predecessor. Must happen before the edge is published
    /// with [`TaskNode::add_successor`] on the predecessor.
    pub fn retain_pending(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one predecessor (or the admission guard). Returns true for the
    /// single caller that brings the count to zero.
    pub fn release_pending(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Register `successor` to be notified on completion. Returns false if
    /// this task already completed, in which case no edge is needed.
    pub fn add_successor(&self, successor: TaskId) -> bool {
        let mut links = lock(&self.links);
        if links.completed {
            return false;
        }
        links.successors.push(successor);
        true
    }

    pub fn take_kernel(&self) -> Option<Box<dyn Kernel>> {
        lock(&self.kernel).take()
    }

    /// Mark completed and hand back the successors to notify.
    pub fn finish(&self) -> Vec<TaskId> {
        let mut links = lock(&self.links);
        links.completed = true;
        self.set_state(TaskState::Completed);
        std::mem::take(&mut links.successors)
    }
}

/// Live tasks indexed by id. Tasks leave the arena once their successors
/// have been notified.
#[derive(Default)]
pub(crate) struct TaskArena {
    slots: RwLock<HashMap<TaskId, Arc<TaskNode>>>,
}

impl TaskArena {
    pub fn insert(&self, node: Arc<TaskNode>) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.id, node);
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<TaskNode>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn remove(&self, id: TaskId) -> Option<Arc<TaskNode>> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Whether `id` names a task that has not completed yet.
    pub fn is_live(&self, id: TaskId) -> bool {
        self.get(id).is_some_and(|node| !node.is_completed())
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::kernel_fn;

    fn node(id: u64) -> TaskNode {
        TaskNode::new(TaskId(id), Box::new(kernel_fn("noop", || Ok(()))), Vec::new())
    }

    #[test]
    fn admission_guard_releases_once() {
        let n = node(1);
        n.retain_pending();
        n.retain_pending();
        assert!(!n.release_pending());
        assert!(!n.release_pending());
        assert!(n.release_pending());
    }

    #[test]
    fn add_successor_after_finish_is_rejected() {
        let n = node(1);
        assert!(n.add_successor(TaskId(2)));
        assert_eq!(n.finish(), vec![TaskId(2)]);
        assert!(!n.add_successor(TaskId(3)));
        assert!(n.is_completed());
        assert_eq!(n.state(), TaskState::Completed);
    }

    #[test]
    fn kernel_taken_once() {
        let n = node(1);
        assert_eq!(n.kernel_name, "noop");
        assert!(n.take_kernel().is_some());
        assert!(n.take_kernel().is_none());
    }

    #[test]
    fn arena_liveness() {
        let arena = TaskArena::default();
        let n = Arc::new(node(4));
        arena.insert(Arc::clone(&n));
        assert!(arena.is_live(TaskId(4)));
        n.finish();
        assert!(!arena.is_live(TaskId(4)));
        arena.remove(TaskId(4));
        assert!(!arena.is_live(TaskId(4)));
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn state_round_trips_through_atomic() {
        let n = node(1);
        assert_eq!(n.state(), TaskState::Pending);
        n.set_state(TaskState::Running);
        assert_eq!(n.state(), TaskState::Running);
    }
}
