use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tessera_core::{KernelFault, SchedulerConfig, SchedulerError, TaskId, TileHandle};
use tracing::{info, warn};

use crate::drain::{next_scheduler_id, on_worker_of, DrainBarrier};
use crate::metrics::SchedulerMetrics;
use crate::registry::{HandleInfo, HandleTable};
use crate::task::{lock, TaskArena, TaskNode, TaskState};

use super::execution::worker_loop;

/// Message on the ready queue.
pub(super) enum ReadyMessage {
    Run(Arc<TaskNode>),
    Shutdown,
}

/// State shared between the submitting side and the workers.
pub(super) struct Shared {
    /// Process-unique id, marks this scheduler's worker threads.
    pub(super) id: u64,
    pub(super) config: SchedulerConfig,
    pub(super) registry: HandleTable,
    pub(super) tasks: TaskArena,
    pub(super) barrier: DrainBarrier,
    pub(super) ready_tx: Sender<ReadyMessage>,
    /// Kernel faults recorded since the last drain.
    pub(super) faults: Mutex<Vec<KernelFault>>,
    pub(super) metrics: RwLock<SchedulerMetrics>,
    /// Next task id, doubles as the submission sequence number.
    pub(super) next_task: AtomicU64,
    /// Set once shutdown starts. Submitters hold the read side for the
    /// whole admission, so no task is admitted after the final drain.
    pub(super) closed: RwLock<bool>,
    pub(super) active_workers: AtomicUsize,
}

/// Dependency-tracking task scheduler.
///
/// Owns the tile handle table, the ready queue and a fixed pool of worker
/// threads. Tasks are admitted with [`Scheduler::submit`] and the caller
/// waits for them with [`Scheduler::drain`]. The pool is stopped by
/// [`Scheduler::shutdown`] or, failing that, on drop.
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl Scheduler {
    /// Create a scheduler and start its worker pool.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let num_workers = config.resolved_worker_threads();
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();

        let metrics = SchedulerMetrics {
            workers: num_workers,
            ..SchedulerMetrics::default()
        };
        let shared = Arc::new(Shared {
            id: next_scheduler_id(),
            config,
            registry: HandleTable::default(),
            tasks: TaskArena::default(),
            barrier: DrainBarrier::default(),
            ready_tx,
            faults: Mutex::new(Vec::new()),
            metrics: RwLock::new(metrics),
            next_task: AtomicU64::new(0),
            closed: RwLock::new(false),
            active_workers: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for index in 0..num_workers {
            let worker_shared = Arc::clone(&shared);
            let rx = ready_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", shared.config.thread_name_prefix, index))
                .spawn(move || worker_loop(worker_shared, rx, index));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    for _ in &workers {
                        let _ = shared.ready_tx.send(ReadyMessage::Shutdown);
                    }
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::Spawn(e.to_string()));
                }
            }
        }

        info!("Scheduler starting with {} workers", num_workers);
        shared.config.log_summary();

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count: num_workers,
        })
    }

    /// Create a scheduler with `worker_threads` workers and default options.
    pub fn with_workers(worker_threads: usize) -> Result<Self, SchedulerError> {
        Self::new(SchedulerConfig::with_workers(worker_threads))
    }

    /// Drain outstanding work, then stop and join the workers.
    ///
    /// Returns the drain outcome, so a kernel fault that was never drained is
    /// still reported here. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        if self.shared.on_own_worker() {
            return Err(SchedulerError::DrainFromWorker);
        }
        let first = {
            let mut closed = self
                .shared
                .closed
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            !std::mem::replace(&mut *closed, true)
        };
        // Admission is closed: whatever is outstanding now is all there is.
        let drained = self.drain();
        if first {
            info!("Scheduler shutdown requested");
            self.stop_workers();
            info!("Scheduler stopped");
        }
        drained
    }

    fn stop_workers(&self) {
        let handles = std::mem::take(&mut *lock(&self.workers));
        for _ in &handles {
            let _ = self.shared.ready_tx.send(ReadyMessage::Shutdown);
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!("Worker thread panicked outside a kernel");
            }
        }
    }

    /// Whether [`Scheduler::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        *self.shared.admission()
    }

    /// Size of the worker pool.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Startup options this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut snapshot = self
            .shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot.tasks_submitted = self.shared.barrier.submitted();
        snapshot.tasks_completed = self.shared.barrier.completed();
        snapshot.active_workers = self.shared.active_workers.load(Ordering::Relaxed);
        snapshot
    }

    /// Tasks submitted but not yet completed.
    pub fn outstanding(&self) -> u64 {
        self.shared.barrier.outstanding()
    }

    /// Current state of a task, `None` if the id was never handed out.
    /// Retired tasks report [`TaskState::Completed`].
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        match self.shared.tasks.get(id) {
            Some(node) => Some(node.state()),
            None if id.0 < self.shared.next_task.load(Ordering::Acquire) => {
                Some(TaskState::Completed)
            }
            None => None,
        }
    }

    /// Tasks still held by the scheduler: submitted and not yet retired.
    pub fn live_tasks(&self) -> usize {
        self.shared.tasks.len()
    }

    /// Bookkeeping snapshot of one tile, `None` if not registered.
    pub fn handle_info(&self, handle: TileHandle) -> Option<HandleInfo> {
        self.shared.registry.info(handle)
    }

    /// Number of currently registered tiles.
    pub fn registered_tiles(&self) -> usize {
        self.shared.registry.len()
    }
}

impl Shared {
    /// Read side of the admission gate; the value is true once closed.
    pub(super) fn admission(&self) -> RwLockReadGuard<'_, bool> {
        self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the calling thread is one of this scheduler's workers.
    pub(super) fn on_own_worker(&self) -> bool {
        on_worker_of(self.id)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_shut_down() {
            return;
        }
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Scheduler dropped with an unreported failure");
        }
    }
}
