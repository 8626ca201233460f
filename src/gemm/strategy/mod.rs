//! Execution strategies and their builders
//!
//! | Strategy | Stages | Tiles |
//! |----------|--------|-------|
//! | [`GemmStrategy::Native`] | multiply | none |
//! | [`GemmStrategy::ReshapedV1`] | reshape A, reshape B, multiply | fixed per architecture |
//! | [`GemmStrategy::Reshaped`] | reshape A, reshape B, multiply | heuristic |
//! | [`GemmStrategy::ReshapedOnlyRhs`] | reshape B, multiply (2 variants) | heuristic |
//!
//! Each strategy module exposes a `validate` over tensor infos and a `build`
//! over tensors. `build` only configures stages whose `validate` already
//! passed for identical infos, so it cannot fail where `validate` succeeded.

mod native;
mod reshaped;
mod reshaped_only_rhs;
mod reshaped_v1;

use super::heuristics::{self, LearnedHeuristics, Selection, Source, TileConfigs};
use super::info::{GemmInfo, GemmKernelInfo};
use super::plan::{ExecutionPlan, RhsReshape, Stage};
use super::query::ProblemQuery;
use super::tiling::{
    LhsTileConfig, RhsTileConfig, compute_lhs_reshaped_shape, compute_rhs_reshaped_shape,
};
use super::weights::WeightsManager;
use crate::error::{Error, Result};
use crate::kernels::{ReshapeLhsKernel, ReshapeRhsKernel};
use crate::runtime::{GpuArch, Lifetime};
use crate::tensor::{Tensor, TensorInfo};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a GEMM is executed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemmStrategy {
    /// Multiply the operands as they are
    Native,
    /// Reshape both operands with fixed tiles (interleave 4x4 / transpose 1xW)
    ReshapedV1,
    /// Reshape both operands with heuristic tiles
    Reshaped,
    /// Reshape only the RHS
    ReshapedOnlyRhs,
}

impl GemmStrategy {
    /// Every strategy
    pub const ALL: [GemmStrategy; 4] = [
        Self::Native,
        Self::ReshapedV1,
        Self::Reshaped,
        Self::ReshapedOnlyRhs,
    ];

    /// Whether the plan contains an LHS reshape stage
    pub fn reshapes_lhs(self) -> bool {
        matches!(self, Self::ReshapedV1 | Self::Reshaped)
    }

    /// Whether the plan contains an RHS reshape stage
    pub fn reshapes_rhs(self) -> bool {
        !matches!(self, Self::Native)
    }
}

impl fmt::Display for GemmStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::ReshapedV1 => "reshaped_v1",
            Self::Reshaped => "reshaped",
            Self::ReshapedOnlyRhs => "reshaped_only_rhs",
        })
    }
}

// ============================================================================
// Builder arguments
// ============================================================================

/// Operand metadata as seen by validation
#[derive(Clone, Copy)]
pub(crate) struct Operands<'a> {
    pub a: &'a TensorInfo,
    pub b: &'a TensorInfo,
    pub c: Option<&'a TensorInfo>,
    pub out: &'a TensorInfo,
    pub alpha: f32,
    pub beta: f32,
    pub info: &'a GemmInfo,
}

impl<'a> Operands<'a> {
    /// C takes part only when it is scaled by a nonzero beta
    pub fn bias(&self) -> Option<&'a TensorInfo> {
        self.c.filter(|_| self.beta != 0.0)
    }

    pub fn kernel_info(&self, q: &ProblemQuery) -> GemmKernelInfo {
        GemmKernelInfo::new(q.m, q.n, q.k, self.info)
    }
}

/// Operand tensors as seen by the builders
#[derive(Clone, Copy)]
pub(crate) struct Tensors<'a> {
    pub a: &'a Tensor,
    pub b: &'a Tensor,
    pub c: Option<&'a Tensor>,
    pub out: &'a Tensor,
    pub alpha: f32,
    pub beta: f32,
    pub info: &'a GemmInfo,
}

impl<'a> Tensors<'a> {
    pub fn bias(&self) -> Option<&'a Tensor> {
        self.c.filter(|_| self.beta != 0.0)
    }

    pub fn kernel_info(&self, q: &ProblemQuery) -> GemmKernelInfo {
        GemmKernelInfo::new(q.m, q.n, q.k, self.info)
    }

    /// Stage inputs for the plan description
    fn with_bias<'t>(&self, inputs: &[&'t Tensor]) -> Vec<&'t Tensor>
    where
        'a: 't,
    {
        let mut all = inputs.to_vec();
        all.extend(self.bias());
        all
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Fixed V1 tiles: wider interleave and transpose factors on Bifrost
pub(crate) fn v1_tiles(q: &ProblemQuery) -> TileConfigs {
    let bifrost = q.arch() == GpuArch::Bifrost;
    let lhs = LhsTileConfig {
        m0: 4,
        k0: 4,
        v0: if bifrost { 2 } else { 1 },
        interleave: true,
        transpose: true,
    };
    let rhs = RhsTileConfig {
        n0: 16 / q.dtype.size_in_bytes(),
        k0: 1,
        h0: if bifrost { 4 } else { 1 },
        interleave: false,
        transpose: false,
    };
    (lhs, rhs)
}

/// Tile selection for `strategy` (`None` for strategies that reshape nothing)
pub(crate) fn select_tiles(
    strategy: GemmStrategy,
    q: &ProblemQuery,
    ops: &Operands<'_>,
    learned: Option<&dyn LearnedHeuristics>,
) -> Option<Selection<TileConfigs>> {
    match strategy {
        GemmStrategy::Native => None,
        GemmStrategy::ReshapedV1 => Some(Selection {
            value: v1_tiles(q),
            source: Source::Default,
        }),
        GemmStrategy::Reshaped => Some(heuristics::select_reshaped_tiles(
            q,
            learned,
            |lhs, rhs| reshaped::validate(ops, q, lhs, rhs),
        )),
        GemmStrategy::ReshapedOnlyRhs => Some(heuristics::select_reshaped_only_rhs_tiles(
            q,
            learned,
            |lhs, rhs| reshaped_only_rhs::validate(ops, q, lhs, rhs),
        )),
    }
}

fn require_tiles(strategy: GemmStrategy, tiles: Option<&TileConfigs>) -> Result<&TileConfigs> {
    tiles.ok_or_else(|| Error::Internal(format!("{strategy} requires tile configurations")))
}

/// Authoritative feasibility check of `strategy` with concrete tiles
pub(crate) fn validate(
    strategy: GemmStrategy,
    q: &ProblemQuery,
    ops: &Operands<'_>,
    tiles: Option<&TileConfigs>,
) -> Result<()> {
    match strategy {
        GemmStrategy::Native => native::validate(ops, q),
        GemmStrategy::ReshapedV1 => {
            let (lhs, rhs) = require_tiles(strategy, tiles)?;
            reshaped_v1::validate(ops, q, lhs, rhs)
        }
        GemmStrategy::Reshaped => {
            let (lhs, rhs) = require_tiles(strategy, tiles)?;
            reshaped::validate(ops, q, lhs, rhs)
        }
        GemmStrategy::ReshapedOnlyRhs => {
            let (lhs, rhs) = require_tiles(strategy, tiles)?;
            reshaped_only_rhs::validate(ops, q, lhs, rhs)
        }
    }
}

/// Build the execution plan of `strategy`
pub(crate) fn build(
    strategy: GemmStrategy,
    q: &ProblemQuery,
    t: &Tensors<'_>,
    tiles: Option<&TileConfigs>,
    weights: Option<&WeightsManager>,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();
    match strategy {
        GemmStrategy::Native => native::build(t, q, &mut plan)?,
        GemmStrategy::ReshapedV1 => {
            let (lhs, rhs) = require_tiles(strategy, tiles)?;
            reshaped_v1::build(t, q, lhs, rhs, weights, &mut plan)?
        }
        GemmStrategy::Reshaped => {
            let (lhs, rhs) = require_tiles(strategy, tiles)?;
            reshaped::build(t, q, lhs, rhs, weights, &mut plan)?
        }
        GemmStrategy::ReshapedOnlyRhs => {
            let (lhs, rhs) = require_tiles(strategy, tiles)?;
            reshaped_only_rhs::build(t, q, lhs, rhs, weights, &mut plan)?
        }
    }
    log::debug!("built {strategy} plan: {:?}", plan.describe());
    Ok(plan)
}

// ============================================================================
// Shared stage helpers
// ============================================================================

/// Info of the scratch tensor an LHS reshape writes
pub(crate) fn reshaped_lhs_info(a: &TensorInfo, cfg: &LhsTileConfig, reinterpret: bool) -> TensorInfo {
    a.clone_with_shape(compute_lhs_reshaped_shape(a, cfg, reinterpret))
}

/// Info of the scratch tensor an RHS reshape writes
pub(crate) fn reshaped_rhs_info(b: &TensorInfo, cfg: &RhsTileConfig) -> TensorInfo {
    b.clone_with_shape(compute_rhs_reshaped_shape(b, cfg))
}

/// Validate the LHS reshape and return the info it produces
fn validate_reshape_lhs(ops: &Operands<'_>, cfg: &LhsTileConfig) -> Result<TensorInfo> {
    let reinterpret = ops.info.reinterpret_input_as_3d;
    let reshaped = reshaped_lhs_info(ops.a, cfg, reinterpret);
    ReshapeLhsKernel::validate(ops.a, &reshaped, cfg, reinterpret)?;
    Ok(reshaped)
}

/// Validate the RHS reshape and return the info it produces
fn validate_reshape_rhs(ops: &Operands<'_>, cfg: &RhsTileConfig) -> Result<TensorInfo> {
    let reshaped = reshaped_rhs_info(ops.b, cfg);
    ReshapeRhsKernel::validate(ops.b, &reshaped, cfg)?;
    Ok(reshaped)
}

/// Add the LHS reshape stage; its scratch is transient
fn build_reshape_lhs(t: &Tensors<'_>, cfg: &LhsTileConfig, plan: &mut ExecutionPlan) -> Result<Tensor> {
    let reinterpret = t.info.reinterpret_input_as_3d;
    let reshaped = Tensor::new(reshaped_lhs_info(&t.a.info(), cfg, reinterpret));
    plan.memory.manage(&reshaped, Lifetime::Transient);
    let kernel = ReshapeLhsKernel::configure(t.a, &reshaped, *cfg, reinterpret)?;
    plan.push(Stage::ReshapeLhs(kernel), &[t.a], &reshaped);
    Ok(reshaped)
}

/// Add the RHS reshape stage
///
/// Managed weights go through the weights manager; otherwise the scratch is
/// persistent when the RHS is reshaped once and transient when it is
/// reshaped on every run.
fn build_reshape_rhs(
    t: &Tensors<'_>,
    cfg: &RhsTileConfig,
    weights: Option<&WeightsManager>,
    plan: &mut ExecutionPlan,
) -> Result<Tensor> {
    if let Some(wm) = weights.filter(|wm| wm.are_weights_managed(t.b)) {
        let handle = wm.acquire(t.b, *cfg)?;
        let reshaped = handle.output().clone();
        plan.push(Stage::ReshapeRhs(RhsReshape::Managed(handle)), &[t.b], &reshaped);
        return Ok(reshaped);
    }

    let reshaped = Tensor::new(reshaped_rhs_info(&t.b.info(), cfg));
    let lifetime = if t.info.reshape_rhs_once {
        Lifetime::Persistent
    } else {
        Lifetime::Transient
    };
    plan.memory.manage(&reshaped, lifetime);
    let kernel = ReshapeRhsKernel::configure(t.b, &reshaped, *cfg)?;
    plan.push(Stage::ReshapeRhs(RhsReshape::Owned(kernel)), &[t.b], &reshaped);
    Ok(reshaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::runtime::GpuTarget;

    fn query(target: GpuTarget, dtype: DType) -> ProblemQuery {
        ProblemQuery {
            target,
            dtype,
            m: 16,
            n: 16,
            k: 16,
            batch_size: 1,
            reshape_rhs_once: true,
        }
    }

    #[test]
    fn test_v1_tiles_per_architecture() {
        let (lhs, rhs) = v1_tiles(&query(GpuTarget::G71, DType::F32));
        assert_eq!((lhs.v0, rhs.h0, rhs.n0), (2, 4, 4));
        let (lhs, rhs) = v1_tiles(&query(GpuTarget::T800, DType::F16));
        assert_eq!((lhs.v0, rhs.h0, rhs.n0), (1, 1, 8));
        assert!(lhs.interleave && lhs.transpose);
        assert!(!rhs.interleave && !rhs.transpose);
    }

    #[test]
    fn test_v1_tiles_are_valid() {
        for target in GpuTarget::ALL {
            for dtype in [DType::F32, DType::F16] {
                let (lhs, rhs) = v1_tiles(&query(target, dtype));
                lhs.validate(dtype).unwrap();
                rhs.validate(dtype).unwrap();
            }
        }
    }

    #[test]
    fn test_strategy_serde_names() {
        let s: GemmStrategy = serde_json::from_str("\"reshaped_only_rhs\"").unwrap();
        assert_eq!(s, GemmStrategy::ReshapedOnlyRhs);
        assert_eq!(GemmStrategy::ReshapedV1.to_string(), "reshaped_v1");
        assert!(!GemmStrategy::Native.reshapes_rhs());
        assert!(!GemmStrategy::ReshapedOnlyRhs.reshapes_lhs());
    }
}
