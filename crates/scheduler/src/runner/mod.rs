//! Scheduler runner -- owns the handle table, task arena, ready queue and
//! worker pool.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, construction, shutdown, and accessor methods
//! - `submission`: dependency resolution and task admission
//! - `execution`: worker loop, kernel execution, and completion propagation

mod core;
mod execution;
mod submission;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
