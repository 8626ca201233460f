//! Matrix multiply over reshaped LHS and RHS with arbitrary tiling (V2)

use super::common::{
    LhsLayout, RhsLayout, bind_multiply, check_float, check_output_and_bias, check_same_dtype,
    check_shape,
};
use crate::error::{Error, Result};
use crate::gemm::GemmKernelInfo;
use crate::gemm::tiling::{lhs_reshaped_shape, rhs_reshaped_shape};
use crate::runtime::{Kernel, Launch};
use crate::tensor::{Tensor, TensorInfo};

/// Multiply stage consuming both reshaped operands
pub struct GemmMatrixMultiplyReshapedKernel {
    lhs: Tensor,
    rhs: Tensor,
    c: Option<Tensor>,
    out: Tensor,
    alpha: f32,
    beta: f32,
    info: GemmKernelInfo,
}

impl GemmMatrixMultiplyReshapedKernel {
    /// Launch record name
    pub const NAME: &'static str = "gemm_mm_reshaped";

    /// Static feasibility check, same arguments as [`Self::configure`]
    pub fn validate(
        lhs: &TensorInfo,
        rhs: &TensorInfo,
        c: Option<&TensorInfo>,
        out: &TensorInfo,
        _alpha: f32,
        _beta: f32,
        info: &GemmKernelInfo,
    ) -> Result<()> {
        check_float(lhs.dtype(), Self::NAME)?;
        check_same_dtype(lhs, rhs)?;
        info.lhs.validate(lhs.dtype())?;
        info.rhs.validate(rhs.dtype())?;
        if info.lhs.k0 != info.rhs.k0 {
            return Err(Error::invalid_tile(
                Self::NAME,
                format!("lhs k0 ({}) != rhs k0 ({})", info.lhs.k0, info.rhs.k0),
            ));
        }
        if info.lhs.transpose == info.rhs.transpose {
            return Err(Error::invalid_tile(
                Self::NAME,
                "exactly one of the LHS and RHS blocks must be transposed",
            ));
        }

        let batch = lhs.num_planes();
        check_shape(&lhs_reshaped_shape(&info.lhs, info.m, info.k, batch), lhs)?;
        let b_batches = rhs.num_planes();
        if b_batches != 1 && b_batches != batch {
            return Err(Error::invalid_argument(
                "rhs",
                format!("{b_batches} matrices cannot pair with {batch} LHS matrices"),
            ));
        }
        check_shape(&rhs_reshaped_shape(&info.rhs, info.k, info.n, b_batches), rhs)?;
        check_output_and_bias(lhs, c, out, info, batch)
    }

    /// Configure the stage
    pub fn configure(
        lhs: &Tensor,
        rhs: &Tensor,
        c: Option<&Tensor>,
        out: &Tensor,
        alpha: f32,
        beta: f32,
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
            &info,
        )?;
        Ok(Self {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            c: c.cloned(),
            out: out.clone(),
            alpha,
            beta,
            info,
        })
    }
}

impl Kernel for GemmMatrixMultiplyReshapedKernel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn launch(&self) -> Result<Launch> {
        let bound = bind_multiply(
            &self.lhs,
            &self.rhs,
            self.c.as_ref(),
            &self.out,
            self.alpha,
            self.beta,
            self.info,
            LhsLayout::Reshaped(self.info.lhs),
            RhsLayout::Reshaped(self.info.rhs),
            true,
        )?;
        Ok(Launch::new(Self::NAME, move || bound.execute()))
    }
}
