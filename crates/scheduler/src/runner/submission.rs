use std::sync::atomic::Ordering;
use std::sync::Arc;

use tessera_core::{normalize_accesses, Access, SchedulerError, TaskId, TileHandle};
use tracing::debug;

use crate::kernel::Kernel;
use crate::task::{lock, TaskNode, TaskState};

use super::core::{ReadyMessage, Scheduler, Shared};

impl Scheduler {
    /// Create `count` fresh tile handles with empty access state.
    pub fn register_tiles(&self, count: usize) -> Vec<TileHandle> {
        self.shared.registry.register(count)
    }

    /// Release tile handles, all or nothing.
    ///
    /// Fails with [`SchedulerError::HandleInUse`] while any of them is the
    /// last writer or a pending reader of an uncompleted task.
    pub fn unregister_tiles(&self, handles: &[TileHandle]) -> Result<(), SchedulerError> {
        let tasks = &self.shared.tasks;
        self.shared.registry.unregister(handles, |id| tasks.is_live(id))
    }

    /// Submit a kernel with its declared tile accesses.
    ///
    /// The task runs once every earlier task it conflicts with has completed:
    /// a write waits for the previous writer and for every reader since, a
    /// read waits for the previous writer only. A handle named more than once
    /// counts once, with its strictest mode.
    ///
    /// Never blocks beyond the per-tile locks. Rejected submissions leave no
    /// trace in the registry.
    pub fn submit<K, A>(&self, kernel: K, accesses: &[A]) -> Result<TaskId, SchedulerError>
    where
        K: Kernel,
        A: Into<Access> + Copy,
    {
        // Held until the task is linked and counted, see `Scheduler::shutdown`.
        let closed = self.shared.admission();
        if *closed {
            return Err(SchedulerError::ShutDown);
        }

        let declared: Vec<Access> = accesses.iter().map(|&a| a.into()).collect();
        let normalized = normalize_accesses(&declared);
        if let Some(max) = self.shared.config.operand_limit() {
            if normalized.len() > max {
                return Err(SchedulerError::TooManyOperands {
                    count: normalized.len(),
                    max,
                });
            }
        }

        let cells = self.shared.registry.lookup(&normalized)?;
        // Ascending handle order, every submitter locks in the same order.
        let mut guards: Vec<_> = cells.iter().map(|c| lock(c)).collect();
        if let Some((access, _)) = normalized.iter().zip(&guards).find(|(_, g)| g.retired) {
            return Err(SchedulerError::UnknownHandle(access.handle));
        }

        // Allocated under the tile locks so per-tile order matches id order.
        let id = TaskId(self.shared.next_task.fetch_add(1, Ordering::AcqRel));
        let node = Arc::new(TaskNode::new(id, Box::new(kernel), declared));
        self.shared.tasks.insert(Arc::clone(&node));
        self.shared.barrier.task_submitted();

        let mut predecessors = Vec::new();
        for (access, state) in normalized.iter().zip(guards.iter_mut()) {
            state.record(*access, id, &mut predecessors);
            state.compact(|t| self.shared.tasks.is_live(t));
        }
        predecessors.sort_unstable();
        predecessors.dedup();

        let mut edges = 0usize;
        for pred in predecessors {
            let Some(pred_node) = self.shared.tasks.get(pred) else {
                continue;
            };
            node.retain_pending();
            if pred_node.add_successor(id) {
                edges += 1;
            } else {
                // Already completed; cannot reach zero while the guard is held.
                node.release_pending();
            }
        }
        drop(guards);

        debug!(
            task = %id,
            kernel = %node.kernel_name,
            operands = normalized.len(),
            accesses = ?node.accesses,
            edges,
            "task submitted"
        );

        if node.release_pending() {
            self.shared.enqueue(node);
        }
        drop(closed);
        Ok(id)
    }
}

impl Shared {
    /// Push a task whose predecessors have all completed onto the ready queue.
    pub(super) fn enqueue(&self, node: Arc<TaskNode>) {
        node.set_state(TaskState::Ready);
        let id = node.id;
        if self.ready_tx.send(ReadyMessage::Run(node)).is_err() {
            tracing::error!(task = %id, "ready queue closed, task dropped");
        } else {
            debug!(task = %id, "task ready");
        }
    }
}
