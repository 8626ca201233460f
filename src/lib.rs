//! # gemmkit
//!
//! **Runtime execution planner for GEMM on GPU-class compute devices.**
//!
//! gemmkit decides *how* a general matrix multiply
//! (`out = act(alpha * A x B + beta * C)`) should be executed on a given device,
//! builds the kernel pipeline for that decision, and drives it through a
//! one-time `prepare` and a repeatable `run`.
//!
//! ## Pipeline
//!
//! ```text
//! ProblemQuery ──► heuristics ──► strategy builder ──► ExecutionPlan
//!                  (learned,       (native, v1, v2,      │
//!                   then default)   rhs-only)            ▼
//!                                                  Gemm::prepare / Gemm::run
//!                                                        │
//!                                                        ▼
//!                                                  CommandQueue (in-order)
//! ```
//!
//! ## Features
//!
//! - **Two-tier selection**: an optional learned heuristics backend, validated
//!   against each stage's own checks, with a per-architecture default table
//! - **Four strategies**: native, reshaped LHS+RHS (fixed and tuned tiles),
//!   reshaped RHS only
//! - **Weights sharing**: a reshaped RHS can be produced once and shared by
//!   every planner consuming the same operand
//! - **Padding-aware dispatch**: the RHS-only strategy picks a fast or a
//!   padding-safe multiply on every run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gemmkit::prelude::*;
//!
//! let queue = Arc::new(HostQueue::new(GpuTarget::G71));
//! let a = Tensor::from_slice(&a_data, &[64, 64])?;
//! let b = Tensor::from_slice(&b_data, &[64, 64])?;
//! let out = Tensor::zeros(&[64, 64], DType::F32);
//!
//! let mut gemm = Gemm::new(GemmContext::new(queue.clone()));
//! gemm.configure(&a, &b, None, &out, 1.0, 0.0, &GemmInfo::default().with_reshape_rhs_once(true))?;
//! gemm.run()?;
//! queue.finish()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): Multi-threaded host reference kernels

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod dtype;
pub mod error;
pub mod gemm;
pub mod kernels;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::DType;
    pub use crate::error::{Error, Result};
    pub use crate::gemm::heuristics::{HeuristicsTable, LearnedHeuristics};
    pub use crate::gemm::{
        ActivationInfo, Gemm, GemmContext, GemmInfo, GemmStrategy, LhsTileConfig, LifecycleState,
        ProblemQuery, RhsTileConfig, WeightsManager,
    };
    pub use crate::runtime::{
        Allocator, CommandQueue, GpuArch, GpuTarget, HostAllocator, HostQueue,
    };
    pub use crate::tensor::{Padding, Shape, Tensor, TensorId, TensorInfo};
    pub use std::sync::Arc;
}
