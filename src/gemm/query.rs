//! Problem description and operand shape rules

use super::info::GemmInfo;
use super::tiling::{lhs_dims, rhs_dims};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::{GpuArch, GpuTarget};
use crate::tensor::{Shape, TensorInfo};

/// Shape, type and target of one GEMM invocation
///
/// Heuristics are a pure function of this value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProblemQuery {
    /// Device the plan will run on
    pub target: GpuTarget,
    /// Element type of A, B and the output
    pub dtype: DType,
    /// Output rows per batch (depth folded in for 3D inputs)
    pub m: usize,
    /// Output columns
    pub n: usize,
    /// Reduction depth
    pub k: usize,
    /// Number of independent matrices
    pub batch_size: usize,
    /// RHS is constant across runs
    pub reshape_rhs_once: bool,
}

impl ProblemQuery {
    /// Derive the query from operand metadata
    pub fn from_operands(
        target: GpuTarget,
        a: &TensorInfo,
        b: &TensorInfo,
        info: &GemmInfo,
    ) -> Self {
        let (m, k, batch_size) = lhs_dims(a, info.reinterpret_input_as_3d);
        Self {
            target,
            dtype: a.dtype(),
            m,
            n: b.cols(),
            k,
            batch_size,
            reshape_rhs_once: info.reshape_rhs_once,
        }
    }

    /// Architecture family of the target
    #[inline]
    pub fn arch(&self) -> GpuArch {
        self.target.arch()
    }
}

/// Shape the output must have for `a x b` under `info`
///
/// Leading (batch) dimensions of A are kept; the matrix part is `[M, N]`,
/// or `[depth, M / depth, N]` when the output is reinterpreted as 3D.
pub fn expected_output_shape(a: &TensorInfo, b: &TensorInfo, info: &GemmInfo) -> Shape {
    let (m, _, _) = lhs_dims(a, info.reinterpret_input_as_3d);
    let matrix_dims = if info.reinterpret_input_as_3d { 3 } else { 2 };
    let leading = a.ndim().saturating_sub(matrix_dims);

    let mut shape: Shape = a.shape()[..leading].iter().copied().collect();
    let depth = info.depth_output_gemm3d;
    if depth > 0 {
        shape.push(depth);
        shape.push(m / depth);
    } else {
        shape.push(m);
    }
    shape.push(b.cols());
    shape
}

/// Structural checks shared by every strategy
///
/// These depend only on the original operands, never on tiling.
pub(crate) fn validate_operands(
    a: &TensorInfo,
    b: &TensorInfo,
    c: Option<&TensorInfo>,
    out: &TensorInfo,
    info: &GemmInfo,
) -> Result<()> {
    if a.dtype() != b.dtype() {
        return Err(Error::DTypeMismatch {
            lhs: a.dtype(),
            rhs: b.dtype(),
        });
    }
    if out.dtype() != a.dtype() {
        return Err(Error::DTypeMismatch {
            lhs: a.dtype(),
            rhs: out.dtype(),
        });
    }
    if a.ndim() < 2 || b.ndim() < 2 {
        return Err(Error::invalid_argument(
            "a/b",
            "operands must have at least two dimensions",
        ));
    }
    if info.reinterpret_input_as_3d && a.ndim() < 3 {
        return Err(Error::invalid_argument(
            "reinterpret_input_as_3d",
            "A must have at least three dimensions",
        ));
    }
    if info.fp_mixed_precision && a.dtype() != DType::F16 {
        return Err(Error::invalid_argument(
            "fp_mixed_precision",
            format!("only supported for f16, got {}", a.dtype()),
        ));
    }

    let (m, k, batch) = lhs_dims(a, info.reinterpret_input_as_3d);
    let (kb, n, b_batch) = rhs_dims(b);
    if m == 0 || n == 0 || k == 0 || batch == 0 {
        return Err(Error::invalid_argument(
            "a/b",
            format!("empty problem (M={m}, N={n}, K={k}, batch={batch})"),
        ));
    }
    if kb != k {
        return Err(Error::shape_mismatch(&[k, n], &[kb, n]));
    }
    if b_batch != 1 && b_batch != batch {
        return Err(Error::invalid_argument(
            "b",
            format!("{b_batch} matrices cannot pair with {batch} LHS matrices"),
        ));
    }

    let depth = info.depth_output_gemm3d;
    if depth > 0 && m % depth != 0 {
        return Err(Error::invalid_argument(
            "depth_output_gemm3d",
            format!("M ({m}) is not divisible by depth {depth}"),
        ));
    }

    let expected = expected_output_shape(a, b, info);
    if out.shape() != &expected {
        return Err(Error::shape_mismatch(&expected, out.shape()));
    }

    if let Some(c) = c {
        if c.dtype() != a.dtype() {
            return Err(Error::DTypeMismatch {
                lhs: a.dtype(),
                rhs: c.dtype(),
            });
        }
        if info.broadcast_bias {
            if c.numel() != n || c.cols() != n {
                return Err(Error::shape_mismatch(&[n], c.shape()));
            }
        } else {
            if info.reinterpret_input_as_3d || depth > 0 {
                return Err(Error::invalid_argument(
                    "c",
                    "bias must be broadcast when input or output is 3D",
                ));
            }
            if c.shape() != &expected {
                return Err(Error::shape_mismatch(&expected, c.shape()));
            }
        }
    }
    Ok(())
}
