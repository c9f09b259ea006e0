use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tessera_core::{Access, AccessMode, KernelError, SchedulerConfig, SchedulerError, TaskId};

use crate::kernel::{kernel_fn, Kernel};
use crate::runner::Scheduler;
use crate::task::TaskState;

/// Mock kernel appending its label to a shared log.
struct LogKernel {
    label: usize,
    log: Arc<Mutex<Vec<usize>>>,
    delay: Duration,
}

impl Kernel for LogKernel {
    fn name(&self) -> &str {
        "log"
    }

    fn execute(self: Box<Self>) -> Result<(), KernelError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.log.lock().unwrap().push(self.label);
        Ok(())
    }
}

fn log_kernel(label: usize, log: &Arc<Mutex<Vec<usize>>>) -> LogKernel {
    LogKernel {
        label,
        log: Arc::clone(log),
        delay: Duration::ZERO,
    }
}

#[test]
fn scheduler_creation() {
    let scheduler = Scheduler::with_workers(3).unwrap();
    assert_eq!(scheduler.worker_count(), 3);
    let metrics = scheduler.metrics();
    assert_eq!(metrics.workers, 3);
    assert_eq!(metrics.tasks_submitted, 0);
    scheduler.shutdown().unwrap();
}

#[test]
fn zero_handle_task_runs() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let id = scheduler
        .submit(
            kernel_fn("pure", move || {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
            &[] as &[Access],
        )
        .unwrap();
    scheduler.drain().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 1);
    assert_eq!(scheduler.task_state(id), Some(TaskState::Completed));
}

#[test]
fn task_ids_are_sequential() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let tiles = scheduler.register_tiles(1);
    let a = scheduler.submit(kernel_fn("a", || Ok(())), &[Access::write(tiles[0])]).unwrap();
    let b = scheduler.submit(kernel_fn("b", || Ok(())), &[Access::read(tiles[0])]).unwrap();
    assert_eq!(a, TaskId(0));
    assert_eq!(b, TaskId(1));
    assert_eq!(scheduler.task_state(TaskId(99)), None);
    scheduler.drain().unwrap();
}

#[test]
fn tuple_accesses_accepted() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let tiles = scheduler.register_tiles(2);
    scheduler
        .submit(
            kernel_fn("tuple", || Ok(())),
            &[(tiles[0], AccessMode::Read), (tiles[1], AccessMode::ReadWrite)],
        )
        .unwrap();
    scheduler.drain().unwrap();
    let info = scheduler.handle_info(tiles[1]).unwrap();
    assert_eq!(info.last_writer, Some(TaskId(0)));
    assert_eq!(scheduler.handle_info(tiles[0]).unwrap().readers, vec![TaskId(0)]);
}

#[test]
fn duplicate_handle_does_not_self_depend() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let tiles = scheduler.register_tiles(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    scheduler
        .submit(
            log_kernel(1, &log),
            &[
                Access::read(tiles[0]),
                Access::write(tiles[0]),
                Access::read_write(tiles[0]),
            ],
        )
        .unwrap();
    // Would hang here if the task waited on itself.
    scheduler.drain().unwrap();
    assert_eq!(*log.lock().unwrap(), vec![1]);
}

#[test]
fn duplicate_handles_count_once_against_capacity() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let tiles = scheduler.register_tiles(3);
    let accesses = [
        Access::read(tiles[0]),
        Access::read(tiles[1]),
        Access::read(tiles[0]),
        Access::read_write(tiles[2]),
    ];
    assert!(scheduler.submit(kernel_fn("dup", || Ok(())), &accesses).is_ok());
    scheduler.drain().unwrap();
}

#[test]
fn unbounded_operands_when_configured() {
    let config = SchedulerConfig {
        worker_threads: 1,
        max_operands: 0,
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::new(config).unwrap();
    let tiles = scheduler.register_tiles(8);
    let accesses: Vec<Access> = tiles.iter().map(|&h| Access::read(h)).collect();
    assert!(scheduler.submit(kernel_fn("wide", || Ok(())), &accesses).is_ok());
    scheduler.drain().unwrap();
}

#[test]
fn unknown_handle_rejected() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let tiles = scheduler.register_tiles(1);
    scheduler.unregister_tiles(&tiles).unwrap();
    let err = scheduler
        .submit(kernel_fn("late", || Ok(())), &[Access::read(tiles[0])])
        .unwrap_err();
    assert_eq!(err, SchedulerError::UnknownHandle(tiles[0]));
    assert_eq!(scheduler.metrics().tasks_submitted, 0);
}

#[test]
fn pending_state_observed_behind_slow_writer() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    let tiles = scheduler.register_tiles(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    let slow = LogKernel {
        label: 0,
        log: Arc::clone(&log),
        delay: Duration::from_millis(100),
    };
    scheduler.submit(slow, &[Access::write(tiles[0])]).unwrap();
    let reader = scheduler.submit(log_kernel(1, &log), &[Access::read(tiles[0])]).unwrap();
    assert_eq!(scheduler.task_state(reader), Some(TaskState::Pending));
    scheduler.drain().unwrap();
    assert_eq!(scheduler.task_state(reader), Some(TaskState::Completed));
    assert_eq!(*log.lock().unwrap(), vec![0, 1]);
}

#[test]
fn submit_after_shutdown_fails() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    scheduler.shutdown().unwrap();
    assert!(scheduler.is_shut_down());
    let err = scheduler
        .submit(kernel_fn("late", || Ok(())), &[] as &[Access])
        .unwrap_err();
    assert_eq!(err, SchedulerError::ShutDown);
    // second shutdown is a no-op
    scheduler.shutdown().unwrap();
}

#[test]
fn metrics_count_per_kernel() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    for _ in 0..5 {
        scheduler.submit(kernel_fn("alpha", || Ok(())), &[] as &[Access]).unwrap();
    }
    scheduler.submit(kernel_fn("beta", || Ok(())), &[] as &[Access]).unwrap();
    scheduler.drain().unwrap();

    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_submitted, 6);
    assert_eq!(metrics.tasks_completed, 6);
    assert_eq!(metrics.tasks_executed["alpha"], 5);
    assert_eq!(metrics.tasks_executed["beta"], 1);
    assert_eq!(scheduler.outstanding(), 0);
}

#[test]
fn drain_inside_kernel_is_rejected() {
    let scheduler = Arc::new(Scheduler::with_workers(1).unwrap());
    let inner = Arc::clone(&scheduler);
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    scheduler
        .submit(
            kernel_fn("reentrant", move || {
                *slot.lock().unwrap() = Some(inner.drain());
                Ok(())
            }),
            &[] as &[Access],
        )
        .unwrap();
    scheduler.drain().unwrap();
    assert_eq!(
        seen.lock().unwrap().take(),
        Some(Err(SchedulerError::DrainFromWorker))
    );
    scheduler.shutdown().unwrap();
}

#[test]
fn kernels_may_submit_follow_up_tasks() {
    let scheduler = Arc::new(Scheduler::with_workers(2).unwrap());
    let tiles = scheduler.register_tiles(1);
    let log = Arc::new(Mutex::new(Vec::new()));

    let inner = Arc::clone(&scheduler);
    let inner_log = Arc::clone(&log);
    let tile = tiles[0];
    scheduler
        .submit(
            kernel_fn("parent", move || {
                inner_log.lock().unwrap().push(0);
                inner
                    .submit(log_kernel(1, &inner_log), &[Access::read_write(tile)])
                    .map(|_| ())
                    .map_err(|e| KernelError::new(e.to_string()))
            }),
            &[Access::read_write(tile)],
        )
        .unwrap();
    scheduler.drain().unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 1]);
    scheduler.shutdown().unwrap();
}

#[test]
fn metrics_recorded_after_lock_poisoned() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let shared = Arc::clone(&scheduler.shared);
    let poisoner = thread::spawn(move || {
        let _guard = shared.metrics.write().unwrap();
        panic!("poison the metrics lock");
    });
    assert!(poisoner.join().is_err());
    assert!(scheduler.shared.metrics.is_poisoned());

    scheduler.submit(kernel_fn("alpha", || Ok(())), &[] as &[Access]).unwrap();
    scheduler.drain().unwrap();
    assert_eq!(scheduler.metrics().tasks_executed["alpha"], 1);
}

#[test]
fn live_tasks_tracks_unretired_work() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock().unwrap();

    let wait = Arc::clone(&gate);
    scheduler
        .submit(
            kernel_fn("hold", move || {
                drop(wait.lock().unwrap());
                Ok(())
            }),
            &[] as &[Access],
        )
        .unwrap();
    scheduler.submit(kernel_fn("after", || Ok(())), &[] as &[Access]).unwrap();
    assert_eq!(scheduler.live_tasks(), 2);

    drop(held);
    scheduler.drain().unwrap();
    assert_eq!(scheduler.live_tasks(), 0);
}
