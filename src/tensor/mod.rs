//! Tensor handles consumed by the planner
//!
//! A [`Tensor`] is a shared handle to a device buffer plus its
//! [`TensorInfo`] (shape, element type, cross-plane padding). The planner
//! reads infos at configure time and binds buffers only when a kernel is
//! launched, so buffers may be (re)allocated between runs.

mod core;
mod id;
mod info;
mod shape;
mod storage;

pub use core::Tensor;
pub use id::TensorId;
pub use info::{Padding, TensorInfo};
pub use shape::Shape;
pub use storage::DeviceBuffer;
