//! Kernel stages parameterized by the planner
//!
//! Every stage exposes a static `validate` taking tensor infos and a
//! `configure` with the same argument shape taking tensors; `configure`
//! always runs `validate` first. Stages implement [`Kernel`] so they can be
//! submitted to any [`CommandQueue`]. Their bodies are host reference
//! implementations that honour the exact memory layout each stage implies.
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | [`ReshapeLhsKernel`] | A | reshaped A |
//! | [`ReshapeRhsKernel`] | B | reshaped B |
//! | [`GemmMatrixMultiplyKernel`] | A, B (or V1-reshaped A, B) | output |
//! | [`GemmMatrixMultiplyReshapedKernel`] | reshaped A, reshaped B | output |
//! | [`GemmMatrixMultiplyReshapedOnlyRhsKernel`] | A, reshaped B | output |
//!
//! [`Kernel`]: crate::runtime::Kernel
//! [`CommandQueue`]: crate::runtime::CommandQueue

pub(crate) mod common;
mod mm;
mod mm_reshaped;
mod mm_reshaped_only_rhs;
mod reshape_lhs;
mod reshape_rhs;

pub use mm::GemmMatrixMultiplyKernel;
pub use mm_reshaped::GemmMatrixMultiplyReshapedKernel;
pub use mm_reshaped_only_rhs::GemmMatrixMultiplyReshapedOnlyRhsKernel;
pub use reshape_lhs::ReshapeLhsKernel;
pub use reshape_rhs::ReshapeRhsKernel;
