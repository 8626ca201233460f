//! Matrix multiply over the original LHS and a reshaped RHS

use super::common::{
    LhsLayout, RhsLayout, bind_multiply, check_float, check_output_and_bias, check_same_dtype,
    check_shape,
};
use crate::error::{Error, Result};
use crate::gemm::GemmKernelInfo;
use crate::gemm::tiling::{lhs_dims, rhs_reshaped_shape};
use crate::runtime::{Kernel, Launch};
use crate::tensor::{Tensor, TensorInfo};

/// Multiply stage consuming A in place and a reshaped B
///
/// Two variants exist for the same tiling. The fast one addresses A and the
/// output as densely packed planes; the `has_pad_y` one honours cross-plane
/// padding on both and is always correct.
pub struct GemmMatrixMultiplyReshapedOnlyRhsKernel {
    lhs: Tensor,
    rhs: Tensor,
    c: Option<Tensor>,
    out: Tensor,
    alpha: f32,
    beta: f32,
    has_pad_y: bool,
    info: GemmKernelInfo,
}

impl GemmMatrixMultiplyReshapedOnlyRhsKernel {
    /// Launch record name of the fast variant
    pub const NAME: &'static str = "gemm_mm_reshaped_only_rhs";
    /// Launch record name of the padding-safe variant
    pub const NAME_PAD_Y: &'static str = "gemm_mm_reshaped_only_rhs_pad_y";

    /// Static feasibility check, same arguments as [`Self::configure`]
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        lhs: &TensorInfo,
        rhs: &TensorInfo,
        c: Option<&TensorInfo>,
        out: &TensorInfo,
        _alpha: f32,
        _beta: f32,
        _has_pad_y: bool,
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

        let (m, k, batch) = lhs_dims(lhs, info.reinterpret_input_as_3d);
        if (m, k) != (info.m, info.k) {
            return Err(Error::shape_mismatch(&[info.m, info.k], &[m, k]));
        }
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

    /// Configure one variant
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        lhs: &Tensor,
        rhs: &Tensor,
        c: Option<&Tensor>,
        out: &Tensor,
        alpha: f32,
        beta: f32,
        has_pad_y: bool,
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
            has_pad_y,
            &info,
        )?;
        Ok(Self {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            c: c.cloned(),
            out: out.clone(),
            alpha,
            beta,
            has_pad_y,
            info,
        })
    }

    /// Whether this is the padding-safe variant
    pub fn has_pad_y(&self) -> bool {
        self.has_pad_y
    }
}

impl Kernel for GemmMatrixMultiplyReshapedOnlyRhsKernel {
    fn name(&self) -> &'static str {
        if self.has_pad_y {
            Self::NAME_PAD_Y
        } else {
            Self::NAME
        }
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
            LhsLayout::Original {
                honour_padding: self.has_pad_y,
            },
            RhsLayout::Reshaped(self.info.rhs),
            self.has_pad_y,
        )?;
        Ok(Launch::new(self.name(), move || bound.execute()))
    }
}
