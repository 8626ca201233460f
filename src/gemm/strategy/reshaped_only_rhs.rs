//! Reshaped RHS only
//!
//! Two multiply stages are configured for the same tiles: one that assumes
//! A and the output have no cross-plane padding, and one that honours it.
//! The controller picks between them on every run.

use super::{Operands, Tensors, build_reshape_rhs, validate_reshape_rhs};
use crate::error::Result;
use crate::gemm::plan::{ExecutionPlan, Multiply, Stage};
use crate::gemm::query::ProblemQuery;
use crate::gemm::tiling::{LhsTileConfig, RhsTileConfig};
use crate::gemm::weights::WeightsManager;
use crate::kernels::GemmMatrixMultiplyReshapedOnlyRhsKernel;

pub(super) fn validate(
    ops: &Operands<'_>,
    q: &ProblemQuery,
    lhs: &LhsTileConfig,
    rhs: &RhsTileConfig,
) -> Result<()> {
    let rhs_reshaped = validate_reshape_rhs(ops, rhs)?;
    let info = ops.kernel_info(q).with_tiles(*lhs, *rhs);
    for has_pad_y in [false, true] {
        GemmMatrixMultiplyReshapedOnlyRhsKernel::validate(
            ops.a,
            &rhs_reshaped,
            ops.bias(),
            ops.out,
            ops.alpha,
            ops.beta,
            has_pad_y,
            &info,
        )?;
    }
    Ok(())
}

pub(super) fn build(
    t: &Tensors<'_>,
    q: &ProblemQuery,
    lhs: &LhsTileConfig,
    rhs: &RhsTileConfig,
    weights: Option<&WeightsManager>,
    plan: &mut ExecutionPlan,
) -> Result<()> {
    let rhs_reshaped = build_reshape_rhs(t, rhs, weights, plan)?;
    let info = t.kernel_info(q).with_tiles(*lhs, *rhs);
    let variant = |has_pad_y| {
        GemmMatrixMultiplyReshapedOnlyRhsKernel::configure(
            t.a,
            &rhs_reshaped,
            t.bias(),
            t.out,
            t.alpha,
            t.beta,
            has_pad_y,
            info,
        )
    };
    let fast = variant(false)?;
    let padded = variant(true)?;
    plan.push(
        Stage::Multiply(Multiply::ReshapedOnlyRhs {
            fast,
            padded,
            lhs: t.a.clone(),
            out: t.out.clone(),
        }),
        &t.with_bias(&[t.a, &rhs_reshaped]),
        t.out,
    );
    Ok(())
}
