//! Shared reshaped-weights cache
//!
//! Several planners often multiply by the same constant RHS (the weights of
//! a layer invoked from different places). With a [`WeightsManager`] the
//! reshaped copy of such an operand is produced once and shared.
//!
//! # Lifecycle of an entry
//!
//! ```text
//! manage(b)          mark b as eligible
//! acquire(b, cfg)    first caller creates the entry (producer + buffer),
//!                    later callers get the same entry; consumers += 1
//! run(entry, queue)  first call allocates and enqueues the producer,
//!                    later calls are no-ops until invalidate(b)
//! release(entry)     consumers -= 1; the last release drops the buffer
//! ```
//!
//! Entries are keyed by operand identity and RHS tiling, so consumers that
//! need a different layout never share a buffer. Only the producer stage of
//! an entry ever writes its buffer.

use crate::error::Result;
use crate::gemm::tiling::{RhsTileConfig, compute_rhs_reshaped_shape};
use crate::kernels::ReshapeRhsKernel;
use crate::runtime::CommandQueue;
use crate::tensor::{Tensor, TensorId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Cache key: operand identity plus the layout it is reshaped into
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WeightsKey {
    /// Original operand
    pub id: TensorId,
    /// Tiling of the reshaped copy
    pub config: RhsTileConfig,
}

#[derive(Debug)]
struct EntryState {
    populated: bool,
    consumers: usize,
}

struct Entry {
    key: WeightsKey,
    producer: ReshapeRhsKernel,
    state: Mutex<EntryState>,
}

/// Handle to a shared reshaped operand
///
/// Returned by [`WeightsManager::acquire`]; hand it back through
/// [`WeightsManager::release`] when the consumer goes away.
#[derive(Clone)]
pub struct ManagedWeights {
    entry: Arc<Entry>,
}

impl ManagedWeights {
    /// Cache key of the entry
    pub fn key(&self) -> WeightsKey {
        self.entry.key
    }

    /// Shared reshaped tensor (bound on the first [`WeightsManager::run`])
    pub fn output(&self) -> &Tensor {
        self.entry.producer.output()
    }

    /// Producer stage
    pub fn producer(&self) -> &ReshapeRhsKernel {
        &self.entry.producer
    }

    /// Whether the producer has been enqueued since creation or the last
    /// invalidation
    pub fn is_populated(&self) -> bool {
        self.entry.state.lock().populated
    }

    /// Whether two handles refer to the same entry
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl std::fmt::Debug for ManagedWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedWeights")
            .field("key", &self.entry.key)
            .field("state", &*self.entry.state.lock())
            .finish()
    }
}

/// Cache of reshaped RHS operands shared across planners
#[derive(Default)]
pub struct WeightsManager {
    managed: Mutex<HashSet<TensorId>>,
    entries: Mutex<HashMap<WeightsKey, Arc<Entry>>>,
}

impl WeightsManager {
    /// Empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `weights` eligible for sharing
    pub fn manage(&self, weights: &Tensor) {
        if self.managed.lock().insert(weights.id()) {
            log::debug!("weights {} now managed", weights.id());
        }
    }

    /// Whether `weights` was registered with [`Self::manage`]
    pub fn are_weights_managed(&self, weights: &Tensor) -> bool {
        self.managed.lock().contains(&weights.id())
    }

    /// Get (or create) the shared reshaped copy of `weights` for `config`
    ///
    /// Creating an entry configures its producer stage but allocates
    /// nothing.
    pub fn acquire(&self, weights: &Tensor, config: RhsTileConfig) -> Result<ManagedWeights> {
        let key = WeightsKey {
            id: weights.id(),
            config,
        };
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            entry.state.lock().consumers += 1;
            log::debug!("weights {} shared ({:?})", key.id, config);
            return Ok(ManagedWeights {
                entry: entry.clone(),
            });
        }

        let info = weights.info();
        let output = Tensor::new(info.clone_with_shape(compute_rhs_reshaped_shape(&info, &config)));
        let producer = ReshapeRhsKernel::configure(weights, &output, config)?;
        let entry = Arc::new(Entry {
            key,
            producer,
            state: Mutex::new(EntryState {
                populated: false,
                consumers: 1,
            }),
        });
        entries.insert(key, entry.clone());
        log::debug!("weights {} cached as {:?}", key.id, output.shape());
        Ok(ManagedWeights { entry })
    }

    /// Produce the shared copy if it has not been produced yet
    ///
    /// Returns whether the producer was enqueued. The caller synchronizes
    /// the queue before exposing the result to other queues.
    pub fn run(&self, weights: &ManagedWeights, queue: &dyn CommandQueue) -> Result<bool> {
        let mut state = weights.entry.state.lock();
        if state.populated {
            return Ok(false);
        }
        weights.output().allocate(queue.allocator())?;
        queue.enqueue(&weights.entry.producer, false)?;
        state.populated = true;
        log::debug!("weights {} reshaped", weights.entry.key.id);
        Ok(true)
    }

    /// Force the next [`Self::run`] of every entry derived from `weights`
    /// to reshape again
    pub fn invalidate(&self, weights: &Tensor) {
        let id = weights.id();
        for entry in self.entries.lock().values() {
            if entry.key.id == id {
                entry.state.lock().populated = false;
            }
        }
    }

    /// Drop one consumer of an entry; the last one frees the shared buffer
    pub fn release(&self, weights: &ManagedWeights) {
        let mut entries = self.entries.lock();
        let mut state = weights.entry.state.lock();
        state.consumers = state.consumers.saturating_sub(1);
        if state.consumers > 0 {
            return;
        }
        let key = weights.entry.key;
        if entries
            .get(&key)
            .is_some_and(|e| Arc::ptr_eq(e, &weights.entry))
        {
            entries.remove(&key);
        }
        state.populated = false;
        weights.output().free();
        log::debug!("weights {} released", key.id);
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entry is live
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for WeightsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightsManager")
            .field("managed", &self.managed.lock().len())
            .field("entries", &self.len())
            .finish()
    }
}
