//! Memory allocator trait and host implementation
//!
//! Scratch buffers for reshaped operands are drawn from the allocator the
//! command queue exposes. Allocation failure surfaces as
//! [`Error::OutOfMemory`] from `prepare`/`run`, never from `configure`.

use crate::error::{Error, Result};
use crate::tensor::DeviceBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory allocator trait for device queues
pub trait Allocator: Send + Sync {
    /// Allocate a zeroed buffer of the given size
    fn allocate(&self, size_bytes: usize) -> Result<Arc<DeviceBuffer>>;

    /// Get the total allocated bytes still alive
    fn allocated_bytes(&self) -> usize {
        0 // Default: tracking not supported
    }
}

/// Host memory allocator with optional capacity limit
///
/// Buffers report back to the allocator when dropped, so
/// [`Allocator::allocated_bytes`] reflects live memory.
#[derive(Clone, Debug, Default)]
pub struct HostAllocator {
    in_use: Arc<AtomicUsize>,
    limit: Option<usize>,
}

impl HostAllocator {
    /// Unbounded allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that fails once more than `limit` bytes are live
    pub fn with_limit(limit: usize) -> Self {
        Self {
            in_use: Arc::new(AtomicUsize::new(0)),
            limit: Some(limit),
        }
    }
}

impl Allocator for HostAllocator {
    fn allocate(&self, size_bytes: usize) -> Result<Arc<DeviceBuffer>> {
        let reserved = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.checked_add(size_bytes)?;
                match self.limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            });
        if reserved.is_err() {
            return Err(Error::OutOfMemory { size: size_bytes });
        }
        Ok(Arc::new(DeviceBuffer::tracked(
            size_bytes,
            self.in_use.clone(),
        )))
    }

    fn allocated_bytes(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}
