use std::borrow::Cow;

use tessera_core::KernelError;

/// A unit of work the scheduler can execute.
///
/// Kernels receive no arguments from the scheduler: implementations capture
/// whatever tile pointers they need when they are built, and the tiles they
/// declare at submission time are what the scheduler protects. A kernel runs
/// exactly once.
pub trait Kernel: Send + 'static {
    /// Human-readable name for logging and metrics.
    fn name(&self) -> &str;

    /// Run the kernel body.
    fn execute(self: Box<Self>) -> Result<(), KernelError>;
}

impl Kernel for Box<dyn Kernel> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(self: Box<Self>) -> Result<(), KernelError> {
        (*self).execute()
    }
}

/// Kernel backed by a closure.
pub struct FnKernel<F> {
    name: Cow<'static, str>,
    body: F,
}

impl<F> Kernel for FnKernel<F>
where
    F: FnOnce() -> Result<(), KernelError> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(self: Box<Self>) -> Result<(), KernelError> {
        (self.body)()
    }
}

/// Wrap a closure as a named kernel.
pub fn kernel_fn<F>(name: impl Into<Cow<'static, str>>, body: F) -> FnKernel<F>
where
    F: FnOnce() -> Result<(), KernelError> + Send + 'static,
{
    FnKernel { name: name.into(), body }
}
