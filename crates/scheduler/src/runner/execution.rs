use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use crossbeam_channel::Receiver;
use tessera_core::{KernelFault, SchedulerError};
use tracing::{debug, error, warn};

use crate::drain::enter_worker;
use crate::task::{lock, TaskNode, TaskState};

use super::core::{ReadyMessage, Scheduler, Shared};

/// Body of every worker thread: block on the ready queue, run, complete.
pub(super) fn worker_loop(shared: Arc<Shared>, rx: Receiver<ReadyMessage>, index: usize) {
    enter_worker(shared.id);
    debug!(worker = index, scheduler = shared.id, "worker started");
    loop {
        match rx.recv() {
            Ok(ReadyMessage::Run(node)) => shared.run_task(&node),
            Ok(ReadyMessage::Shutdown) | Err(_) => break,
        }
    }
    debug!(worker = index, "worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}

impl Shared {
    pub(super) fn run_task(&self, node: &Arc<TaskNode>) {
        node.set_state(TaskState::Running);
        self.active_workers.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let outcome = match node.take_kernel() {
            Some(kernel) => match panic::catch_unwind(AssertUnwindSafe(|| kernel.execute())) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(payload) => Err(panic_message(payload.as_ref())),
            },
            None => Err("kernel already consumed".to_string()),
        };
        let duration = start.elapsed();
        self.active_workers.fetch_sub(1, Ordering::Relaxed);

        let faulted = outcome.is_err();
        if let Err(message) = outcome {
            let fault = KernelFault {
                task: node.id,
                kernel: node.kernel_name.clone(),
                message,
            };
            error!(task = %node.id, kernel = %node.kernel_name, "{}", fault);
            lock(&self.faults).push(fault);
        } else {
            debug!(task = %node.id, kernel = %node.kernel_name, ?duration, "task completed");
        }

        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_execution(&node.kernel_name, duration, faulted);

        self.complete(node);
    }

    /// Retire a task: notify successors, leave the arena, count completion.
    /// Runs for failed kernels too so nothing downstream hangs.
    fn complete(&self, node: &Arc<TaskNode>) {
        for successor in node.finish() {
            match self.tasks.get(successor) {
                Some(next) => {
                    if next.release_pending() {
                        self.enqueue(next);
                    }
                }
                None => warn!(task = %successor, "successor missing from arena"),
            }
        }
        self.tasks.remove(node.id);
        self.barrier.task_completed();
    }
}

impl Scheduler {
    /// Block until every submitted task has completed.
    ///
    /// Returns the first kernel fault recorded since the previous drain; the
    /// fault list is cleared either way. Must not be called from a kernel
    /// running on this scheduler; kernels of another scheduler may.
    pub fn drain(&self) -> Result<(), SchedulerError> {
        if self.shared.on_own_worker() {
            return Err(SchedulerError::DrainFromWorker);
        }
        self.shared.barrier.wait();

        let faults = std::mem::take(
            &mut *self
                .shared
                .faults
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if faults.len() > 1 {
            warn!(count = faults.len(), "multiple kernel faults, reporting the first");
        }
        match faults.into_iter().next() {
            Some(first) => Err(SchedulerError::Kernel(first)),
            None => Ok(()),
        }
    }
}
