//! Native and interleaved/transposed (V1) matrix multiply

use super::common::{
    LhsLayout, RhsLayout, bind_multiply, check_float, check_output_and_bias, check_same_dtype,
    check_shape,
};
use crate::error::{Error, Result};
use crate::gemm::GemmKernelInfo;
use crate::gemm::tiling::{lhs_dims, lhs_reshaped_shape, rhs_reshaped_shape};
use crate::runtime::{Kernel, Launch};
use crate::tensor::{Tensor, TensorInfo};

/// Matrix multiply over original operands, or over operands produced by the
/// fixed V1 reshapes
///
/// When `is_interleaved_transposed` is set, `lhs`/`rhs` must be the
/// reshaped tensors described by `info.lhs`/`info.rhs`.
pub struct GemmMatrixMultiplyKernel {
    lhs: Tensor,
    rhs: Tensor,
    c: Option<Tensor>,
    out: Tensor,
    alpha: f32,
    beta: f32,
    is_interleaved_transposed: bool,
    info: GemmKernelInfo,
}

impl GemmMatrixMultiplyKernel {
    /// Launch record name of the native variant
    pub const NAME: &'static str = "gemm_mm_native";
    /// Launch record name of the V1 variant
    pub const NAME_INTERLEAVED: &'static str = "gemm_mm_interleaved_transposed";

    /// Static feasibility check, same arguments as [`Self::configure`]
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        lhs: &TensorInfo,
        rhs: &TensorInfo,
        c: Option<&TensorInfo>,
        out: &TensorInfo,
        _alpha: f32,
        _beta: f32,
        is_interleaved_transposed: bool,
        info: &GemmKernelInfo,
    ) -> Result<()> {
        check_float(lhs.dtype(), "gemm_mm")?;
        check_same_dtype(lhs, rhs)?;
        if info.fp_mixed_precision && lhs.dtype() != crate::dtype::DType::F16 {
            return Err(Error::unsupported_dtype(lhs.dtype(), "gemm_mm_mixed_precision"));
        }

        let batch = if is_interleaved_transposed {
            info.lhs.validate(lhs.dtype())?;
            info.rhs.validate(rhs.dtype())?;
            let batch = lhs.num_planes();
            check_shape(&lhs_reshaped_shape(&info.lhs, info.m, info.k, batch), lhs)?;
            check_shape(
                &rhs_reshaped_shape(&info.rhs, info.k, info.n, rhs.num_planes()),
                rhs,
            )?;
            batch
        } else {
            let (m, k, batch) = lhs_dims(lhs, info.reinterpret_input_as_3d);
            if (m, k) != (info.m, info.k) {
                return Err(Error::shape_mismatch(&[info.m, info.k], &[m, k]));
            }
            if (rhs.rows(), rhs.cols()) != (info.k, info.n) {
                return Err(Error::shape_mismatch(&[info.k, info.n], rhs.shape()));
            }
            batch
        };

        let b_batches = rhs.num_planes();
        if b_batches != 1 && b_batches != batch {
            return Err(Error::invalid_argument(
                "rhs",
                format!("{b_batches} matrices cannot pair with {batch} LHS matrices"),
            ));
        }
        check_output_and_bias(lhs, c, out, info, batch)
    }

    /// Configure the stage
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        lhs: &Tensor,
        rhs: &Tensor,
        c: Option<&Tensor>,
        out: &Tensor,
        alpha: f32,
        beta: f32,
        is_interleaved_transposed: bool,
        info: GemmKernelInfo,
    ) -> Result<Self> {
        let c_info = c.map(Tensor::info);
        Self::validate(
            &lhs.info(),
            &rhs.info(),
            c_info.as_ref(),
            &out.info(),
            alpha,
            beta,
            is_interleaved_transposed,
            &info,
        )?;
        Ok(Self {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            c: c.cloned(),
            out: out.clone(),
            alpha,
            beta,
            is_interleaved_transposed,
            info,
        })
    }

    /// Kernel descriptor
    pub fn info(&self) -> &GemmKernelInfo {
        &self.info
    }
}

impl Kernel for GemmMatrixMultiplyKernel {
    fn name(&self) -> &'static str {
        if self.is_interleaved_transposed {
            Self::NAME_INTERLEAVED
        } else {
            Self::NAME
        }
    }

    fn launch(&self) -> Result<Launch> {
        let (lhs_layout, rhs_layout) = if self.is_interleaved_transposed {
            (
                LhsLayout::Reshaped(self.info.lhs),
                RhsLayout::Reshaped(self.info.rhs),
            )
        } else {
            (
                LhsLayout::Original {
                    honour_padding: true,
                },
                RhsLayout::Original,
            )
        };
        let bound = bind_multiply(
            &self.lhs,
            &self.rhs,
            self.c.as_ref(),
            &self.out,
            self.alpha,
            self.beta,
            self.info,
            lhs_layout,
            rhs_layout,
            true,
        )?;
        Ok(Launch::new(self.name(), move || bound.execute()))
    }
}
