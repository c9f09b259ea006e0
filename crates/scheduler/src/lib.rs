//! Dependency-tracked task scheduler for tiled kernels.
//!
//! Tasks declare which tiles they read and write. The [`Scheduler`] derives
//! the dependency edges from those declarations, runs ready tasks on a fixed
//! worker pool and lets the caller wait for everything with
//! [`Scheduler::drain`].

pub mod drain;
pub mod kernel;
pub mod metrics;
pub mod registry;
pub mod runner;
pub mod task;

pub use kernel::{kernel_fn, FnKernel, Kernel};
pub use metrics::SchedulerMetrics;
pub use registry::HandleInfo;
pub use runner::Scheduler;
pub use task::TaskState;

pub use tessera_core::{
    Access, AccessMode, KernelError, KernelFault, SchedulerConfig, SchedulerError, TaskId,
    TileHandle,
};
