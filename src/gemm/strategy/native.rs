//! Native strategy: one multiply over the original operands

use super::{Operands, Tensors};
use crate::error::Result;
use crate::gemm::plan::{ExecutionPlan, Multiply, Stage};
use crate::gemm::query::ProblemQuery;
use crate::kernels::GemmMatrixMultiplyKernel;

pub(super) fn validate(ops: &Operands<'_>, q: &ProblemQuery) -> Result<()> {
    GemmMatrixMultiplyKernel::validate(
        ops.a,
        ops.b,
        ops.bias(),
        ops.out,
        ops.alpha,
        ops.beta,
        false,
        &ops.kernel_info(q),
    )
}

pub(super) fn build(t: &Tensors<'_>, q: &ProblemQuery, plan: &mut ExecutionPlan) -> Result<()> {
    let mm = GemmMatrixMultiplyKernel::configure(
        t.a,
        t.b,
        t.bias(),
        t.out,
        t.alpha,
        t.beta,
        false,
        t.kernel_info(q),
    )?;
    plan.push(
        Stage::Multiply(Multiply::Native(mm)),
        &t.with_bias(&[t.a, t.b]),
        t.out,
    );
    Ok(())
}
