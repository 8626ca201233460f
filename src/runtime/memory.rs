//! Scratch memory groups
//!
//! A [`MemoryGroup`] owns the scratch tensors of one execution plan. Each
//! tensor is registered with a [`Lifetime`]:
//!
//! - `Transient` buffers are bound at the start of a run and released at
//!   its end, so they can be recycled between runs.
//! - `Persistent` buffers are bound on first use and kept until the group
//!   is dropped (a reshaped RHS computed once and reused).
//!
//! Releasing a transient buffer while launches that read it are still
//! queued is safe: launches keep their own reference to the buffer.

use super::Allocator;
use crate::error::Result;
use crate::tensor::Tensor;

/// How long a scratch buffer stays bound
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// Bound for the duration of one run
    Transient,
    /// Bound until the owning plan is dropped
    Persistent,
}

/// Scratch tensors owned by one execution plan
#[derive(Debug, Default)]
pub struct MemoryGroup {
    entries: Vec<(Tensor, Lifetime)>,
}

impl MemoryGroup {
    /// Empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scratch tensor
    pub fn manage(&mut self, tensor: &Tensor, lifetime: Lifetime) {
        log::debug!(
            "scratch {} {:?} registered as {:?}",
            tensor.id(),
            tensor.shape(),
            lifetime
        );
        self.entries.push((tensor.clone(), lifetime));
    }

    /// Bind a buffer to every registered tensor that has none
    pub fn acquire(&self, allocator: &dyn Allocator) -> Result<()> {
        for (tensor, _) in &self.entries {
            tensor.allocate(allocator)?;
        }
        Ok(())
    }

    /// Bind buffers to persistent tensors only
    pub fn acquire_persistent(&self, allocator: &dyn Allocator) -> Result<()> {
        for (tensor, lifetime) in &self.entries {
            if *lifetime == Lifetime::Persistent {
                tensor.allocate(allocator)?;
            }
        }
        Ok(())
    }

    /// Drop the buffers of transient tensors
    pub fn release(&self) {
        for (tensor, lifetime) in &self.entries {
            if *lifetime == Lifetime::Transient {
                tensor.free();
            }
        }
    }

    /// Acquire now and release transient buffers when the scope ends
    pub fn scope<'a>(&'a self, allocator: &dyn Allocator) -> Result<MemoryGroupScope<'a>> {
        self.acquire(allocator)?;
        Ok(MemoryGroupScope { group: self })
    }

    /// Registered tensors and their lifetimes
    pub fn entries(&self) -> &[(Tensor, Lifetime)] {
        &self.entries
    }

    /// Whether any tensor is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Guard returned by [`MemoryGroup::scope`]
pub struct MemoryGroupScope<'a> {
    group: &'a MemoryGroup,
}

impl Drop for MemoryGroupScope<'_> {
    fn drop(&mut self) {
        self.group.release();
    }
}
