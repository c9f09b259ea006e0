use thiserror::Error;

use crate::access::{TaskId, TileHandle};

/// Error returned by a kernel body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct KernelError(pub String);

impl KernelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A kernel that failed or panicked while executing a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("kernel `{kernel}` failed in task {task}: {message}")]
pub struct KernelFault {
    pub task: TaskId,
    pub kernel: String,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task declares {count} distinct tiles, at most {max} are supported")]
    TooManyOperands { count: usize, max: usize },

    #[error("tile {0} still has outstanding tasks")]
    HandleInUse(TileHandle),

    #[error("tile {0} is not registered")]
    UnknownHandle(TileHandle),

    #[error(transparent)]
    Kernel(#[from] KernelFault),

    #[error("drain called from a worker thread")]
    DrainFromWorker,

    #[error("scheduler is shut down")]
    ShutDown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_fault_message_names_task_and_kernel() {
        let fault = KernelFault {
            task: TaskId(3),
            kernel: "factorize".to_string(),
            message: "zero pivot".to_string(),
        };
        assert_eq!(
            fault.to_string(),
            "kernel `factorize` failed in task t3: zero pivot"
        );

        let err: SchedulerError = fault.clone().into();
        assert_eq!(err.to_string(), fault.to_string());
    }

    #[test]
    fn too_many_operands_message() {
        let err = SchedulerError::TooManyOperands { count: 4, max: 3 };
        assert_eq!(
            err.to_string(),
            "task declares 4 distinct tiles, at most 3 are supported"
        );
    }
}
