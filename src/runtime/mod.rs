//! Device runtime collaborators
//!
//! The planner never talks to a device directly. Everything it needs is
//! injected through these traits:
//!
//! ```text
//! CommandQueue (in-order submission, one per device)
//! ├── target()     → GpuTarget (selects heuristics tables)
//! ├── allocator()  → Allocator (scratch buffers)
//! ├── enqueue()    ← Kernel::launch() binds buffers at submission time
//! └── finish()     blocks until every submitted launch completed
//! ```
//!
//! [`HostQueue`] is the reference implementation: it runs launches on a
//! worker thread strictly in submission order.

mod allocator;
mod host;
mod memory;
mod queue;
mod target;

pub use allocator::{Allocator, HostAllocator};
pub use host::HostQueue;
pub use memory::{Lifetime, MemoryGroup, MemoryGroupScope};
pub use queue::{CommandQueue, Kernel, Launch, LaunchRecord};
pub use target::{GpuArch, GpuTarget};
