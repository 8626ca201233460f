//! Reshaped LHS and RHS with heuristic tiles (V2)

use super::{
    Operands, Tensors, build_reshape_lhs, build_reshape_rhs, validate_reshape_lhs,
    validate_reshape_rhs,
};
use crate::error::Result;
use crate::gemm::plan::{ExecutionPlan, Multiply, Stage};
use crate::gemm::query::ProblemQuery;
use crate::gemm::tiling::{LhsTileConfig, RhsTileConfig};
use crate::gemm::weights::WeightsManager;
use crate::kernels::GemmMatrixMultiplyReshapedKernel;

pub(super) fn validate(
    ops: &Operands<'_>,
    q: &ProblemQuery,
    lhs: &LhsTileConfig,
    rhs: &RhsTileConfig,
) -> Result<()> {
    let lhs_reshaped = validate_reshape_lhs(ops, lhs)?;
    let rhs_reshaped = validate_reshape_rhs(ops, rhs)?;
    GemmMatrixMultiplyReshapedKernel::validate(
        &lhs_reshaped,
        &rhs_reshaped,
        ops.bias(),
        ops.out,
        ops.alpha,
        ops.beta,
        &ops.kernel_info(q).with_tiles(*lhs, *rhs),
    )
}

pub(super) fn build(
    t: &Tensors<'_>,
    q: &ProblemQuery,
    lhs: &LhsTileConfig,
    rhs: &RhsTileConfig,
    weights: Option<&WeightsManager>,
    plan: &mut ExecutionPlan,
) -> Result<()> {
    let lhs_reshaped = build_reshape_lhs(t, lhs, plan)?;
    let rhs_reshaped = build_reshape_rhs(t, rhs, weights, plan)?;
    let mm = GemmMatrixMultiplyReshapedKernel::configure(
        &lhs_reshaped,
        &rhs_reshaped,
        t.bias(),
        t.out,
        t.alpha,
        t.beta,
        t.kernel_info(q).with_tiles(*lhs, *rhs),
    )?;
    plan.push(
        Stage::Multiply(Multiply::Reshaped(mm)),
        &t.with_bias(&[&lhs_reshaped, &rhs_reshaped]),
        t.out,
    );
    Ok(())
}
