//! LHS reshape stage

use super::common::{Bound, MatrixView, check_same_dtype, check_shape};
use crate::error::Result;
use crate::gemm::tiling::{LhsTileConfig, compute_lhs_reshaped_shape, lhs_dims, lhs_offset};
use crate::runtime::{Kernel, Launch};
use crate::tensor::{Tensor, TensorInfo};

/// Rewrites A into `m0 x k0` blocks (see [`crate::gemm::tiling`])
pub struct ReshapeLhsKernel {
    input: Tensor,
    output: Tensor,
    cfg: LhsTileConfig,
    reinterpret_input_as_3d: bool,
}

impl ReshapeLhsKernel {
    /// Launch record name
    pub const NAME: &'static str = "gemm_reshape_lhs";

    /// Static feasibility check, same arguments as [`Self::configure`]
    pub fn validate(
        input: &TensorInfo,
        output: &TensorInfo,
        cfg: &LhsTileConfig,
        reinterpret_input_as_3d: bool,
    ) -> Result<()> {
        cfg.validate(input.dtype())?;
        check_same_dtype(input, output)?;
        let expected = compute_lhs_reshaped_shape(input, cfg, reinterpret_input_as_3d);
        check_shape(&expected, output)
    }

    /// Configure the stage
    pub fn configure(
        input: &Tensor,
        output: &Tensor,
        cfg: LhsTileConfig,
        reinterpret_input_as_3d: bool,
    ) -> Result<Self> {
        Self::validate(&input.info(), &output.info(), &cfg, reinterpret_input_as_3d)?;
        Ok(Self {
            input: input.clone(),
            output: output.clone(),
            cfg,
            reinterpret_input_as_3d,
        })
    }

    /// Reshaped tensor this stage writes
    pub fn output(&self) -> &Tensor {
        &self.output
    }
}

impl Kernel for ReshapeLhsKernel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn launch(&self) -> Result<Launch> {
        let src = Bound::new(&self.input)?;
        let dst = Bound::new(&self.output)?;
        let cfg = self.cfg;
        let reinterpret = self.reinterpret_input_as_3d;

        Ok(Launch::new(Self::NAME, move || {
            let (m, k, batch) = lhs_dims(&src.info, reinterpret);
            let view = MatrixView::new(&src.info, m, true);
            let values = src.values();

            let plane = dst.info.rows() * dst.info.cols();
            let mut reshaped = vec![0.0f32; dst.info.storage_elements()];
            for b in 0..batch {
                for r in 0..m {
                    for c in 0..k {
                        reshaped[b * plane + lhs_offset(&cfg, k, r, c)] = values[view.offset(b, r, c)];
                    }
                }
            }
            dst.buffer.write_f32(dst.info.dtype(), &reshaped);
            Ok(())
        }))
    }
}
