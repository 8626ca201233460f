//! RHS reshape stage

use super::common::{Bound, MatrixView, check_same_dtype, check_shape};
use crate::error::Result;
use crate::gemm::tiling::{RhsTileConfig, compute_rhs_reshaped_shape, rhs_dims, rhs_offset};
use crate::runtime::{Kernel, Launch};
use crate::tensor::{Tensor, TensorInfo};

/// Rewrites B into `k0 x n0` blocks (see [`crate::gemm::tiling`])
pub struct ReshapeRhsKernel {
    input: Tensor,
    output: Tensor,
    cfg: RhsTileConfig,
}

impl ReshapeRhsKernel {
    /// Launch record name
    pub const NAME: &'static str = "gemm_reshape_rhs";

    /// Static feasibility check, same arguments as [`Self::configure`]
    pub fn validate(input: &TensorInfo, output: &TensorInfo, cfg: &RhsTileConfig) -> Result<()> {
        cfg.validate(input.dtype())?;
        check_same_dtype(input, output)?;
        check_shape(&compute_rhs_reshaped_shape(input, cfg), output)
    }

    /// Configure the stage
    pub fn configure(input: &Tensor, output: &Tensor, cfg: RhsTileConfig) -> Result<Self> {
        Self::validate(&input.info(), &output.info(), &cfg)?;
        Ok(Self {
            input: input.clone(),
            output: output.clone(),
            cfg,
        })
    }

    /// Reshaped tensor this stage writes
    pub fn output(&self) -> &Tensor {
        &self.output
    }
}

impl Kernel for ReshapeRhsKernel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn launch(&self) -> Result<Launch> {
        let src = Bound::new(&self.input)?;
        let dst = Bound::new(&self.output)?;
        let cfg = self.cfg;

        Ok(Launch::new(Self::NAME, move || {
            let (k, n, batches) = rhs_dims(&src.info);
            let view = MatrixView::new(&src.info, k, true);
            let values = src.values();

            let plane = dst.info.rows() * dst.info.cols();
            let mut reshaped = vec![0.0f32; dst.info.storage_elements()];
            for b in 0..batches {
                for r in 0..k {
                    for c in 0..n {
                        reshaped[b * plane + rhs_offset(&cfg, k, r, c)] = values[view.offset(b, r, c)];
                    }
                }
            }
            dst.buffer.write_f32(dst.info.dtype(), &reshaped);
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn test_launch_writes_block_layout() {
        // B = [[1, 2, 3], [4, 5, 6]], blocks of k0=2 x n0=2
        let data: Vec<f32> = (1..=6).map(|v| v as f32).collect();
        let b = Tensor::from_slice(&data, &[2, 3]).unwrap();
        let cfg = RhsTileConfig {
            n0: 2,
            k0: 2,
            h0: 2,
            interleave: false,
            transpose: false,
        };
        let shape = compute_rhs_reshaped_shape(&b.info(), &cfg);
        assert_eq!(shape.as_slice(), &[1, 1, 8]);
        let out = Tensor::zeros(&shape, DType::F32);
        let kernel = ReshapeRhsKernel::configure(&b, &out, cfg).unwrap();
        kernel.launch().unwrap().execute().unwrap();
        assert_eq!(
            out.to_vec::<f32>().unwrap(),
            vec![1.0, 2.0, 4.0, 5.0, 3.0, 0.0, 6.0, 0.0]
        );
    }

    #[test]
    fn test_launch_requires_allocated_output() {
        let b = Tensor::zeros(&[4, 4], DType::F32);
        let cfg = RhsTileConfig::default();
        let info = b.info().clone_with_shape(compute_rhs_reshaped_shape(&b.info(), &cfg));
        let out = Tensor::new(info);
        let kernel = ReshapeRhsKernel::configure(&b, &out, cfg).unwrap();
        assert!(kernel.launch().is_err());
    }
}
