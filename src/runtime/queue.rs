//! Kernel launch and command queue traits

use super::{Allocator, GpuTarget};
use crate::error::Result;

/// Work bound to concrete buffers, ready to execute on a queue
///
/// Produced by [`Kernel::launch`] at submission time; executing it never
/// consults the tensors it was created from.
pub struct Launch {
    kernel: &'static str,
    body: Box<dyn FnOnce() -> Result<()> + Send>,
}

impl Launch {
    /// Wrap a bound kernel body
    pub fn new(kernel: &'static str, body: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            kernel,
            body: Box::new(body),
        }
    }

    /// Kernel name
    pub fn kernel(&self) -> &'static str {
        self.kernel
    }

    /// Execute the kernel body
    pub fn execute(self) -> Result<()> {
        (self.body)()
    }
}

/// A configured kernel stage
///
/// Implementations are configured once and launched any number of times.
pub trait Kernel: Send + Sync {
    /// Stable kernel name, used in launch records
    fn name(&self) -> &'static str;

    /// Bind the current buffers of every operand
    ///
    /// Fails with [`Error::NotAllocated`](crate::error::Error::NotAllocated)
    /// if an operand has no buffer.
    fn launch(&self) -> Result<Launch>;
}

/// Record of one submitted launch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRecord {
    /// Submission sequence number, starting at 0
    pub sequence: u64,
    /// Kernel name
    pub kernel: &'static str,
    /// Whether the submission asked for an immediate flush
    pub flush: bool,
}

/// In-order device command queue
///
/// Work is executed in submission order, so a stage observes the complete
/// output of every stage enqueued before it without further barriers.
pub trait CommandQueue: Send + Sync {
    /// Device the queue submits to
    fn target(&self) -> GpuTarget;

    /// Allocator for scratch buffers on this device
    fn allocator(&self) -> &dyn Allocator;

    /// Submit a kernel; does not wait for it to execute
    fn enqueue(&self, kernel: &dyn Kernel, flush: bool) -> Result<()>;

    /// Block until every submitted launch has completed
    ///
    /// Returns the first kernel failure observed since the previous call.
    fn finish(&self) -> Result<()>;
}
