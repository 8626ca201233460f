//! Shared pieces of the host reference kernels
//!
//! Every multiply stage follows the same three steps:
//!
//! 1. Gather the logical A (`[batch][M][K]`) and B (`[batches][K][N]`) as
//!    f32, reading through whatever layout the operand is stored in.
//! 2. Multiply-accumulate in f32, then apply `alpha`, the bias and the
//!    activation.
//! 3. Scatter the result into the output buffer, leaving padding rows alone.

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::gemm::tiling::{
    LhsTileConfig, RhsTileConfig, lhs_offset, lhs_plane_len, rhs_offset, rhs_plane_len,
};
use crate::gemm::{ActivationInfo, GemmKernelInfo};
use crate::tensor::{DeviceBuffer, Tensor, TensorInfo};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::sync::Arc;

/// Minimum output rows before the multiply is split across threads
#[cfg(feature = "rayon")]
const PARALLEL_MIN_ROWS: usize = 16;

// ============================================================================
// Operand binding
// ============================================================================

/// A tensor's buffer and metadata captured at launch time
pub(crate) struct Bound {
    pub info: TensorInfo,
    pub buffer: Arc<DeviceBuffer>,
}

impl Bound {
    pub fn new(tensor: &Tensor) -> Result<Self> {
        let (info, buffer) = tensor.bind()?;
        Ok(Self { info, buffer })
    }

    /// Raw storage widened to f32
    pub fn values(&self) -> Vec<f32> {
        self.buffer.read_f32(self.info.dtype())
    }
}

/// Row addressing of a matrix operand
///
/// Maps `(batch, row, col)` of a logical `rows_per_batch x cols` matrix onto
/// the buffer, optionally ignoring cross-plane padding (the fast variants
/// assume it is zero).
#[derive(Clone, Debug)]
pub(crate) struct MatrixView {
    rows_per_plane: usize,
    cols: usize,
    planes_per_batch: usize,
    batches: usize,
    plane_stride_rows: usize,
    top: usize,
}

impl MatrixView {
    pub fn new(info: &TensorInfo, rows_per_batch: usize, honour_padding: bool) -> Self {
        let rows_per_plane = info.rows().max(1);
        let planes_per_batch = (rows_per_batch / rows_per_plane).max(1);
        let padding = info.padding();
        let (plane_stride_rows, top) = if honour_padding {
            (rows_per_plane + padding.cross_plane(), padding.top)
        } else {
            (rows_per_plane, 0)
        };
        Self {
            rows_per_plane,
            cols: info.cols(),
            planes_per_batch,
            batches: (info.num_planes() / planes_per_batch).max(1),
            plane_stride_rows,
            top,
        }
    }

    /// Number of matrices stored in the buffer
    pub fn batches(&self) -> usize {
        self.batches
    }

    #[inline]
    pub fn offset(&self, batch: usize, row: usize, col: usize) -> usize {
        let batch = if self.batches == 1 { 0 } else { batch };
        let plane = batch * self.planes_per_batch + row / self.rows_per_plane;
        (plane * self.plane_stride_rows + self.top + row % self.rows_per_plane) * self.cols + col
    }
}

/// Read `batches x rows x cols` logical values through a view
pub(crate) fn gather(
    values: &[f32],
    view: &MatrixView,
    batches: usize,
    rows: usize,
    cols: usize,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(batches * rows * cols);
    for b in 0..batches {
        for r in 0..rows {
            for c in 0..cols {
                out.push(values[view.offset(b, r, c)]);
            }
        }
    }
    out
}

/// Read the logical LHS back out of its reshaped layout
pub(crate) fn gather_reshaped_lhs(
    values: &[f32],
    cfg: &LhsTileConfig,
    m: usize,
    k: usize,
    batches: usize,
) -> Vec<f32> {
    let plane = lhs_plane_len(cfg, m, k);
    let mut out = Vec::with_capacity(batches * m * k);
    for b in 0..batches {
        for r in 0..m {
            for c in 0..k {
                out.push(values[b * plane + lhs_offset(cfg, k, r, c)]);
            }
        }
    }
    out
}

/// Read the logical RHS back out of its reshaped layout
pub(crate) fn gather_reshaped_rhs(
    values: &[f32],
    cfg: &RhsTileConfig,
    k: usize,
    n: usize,
    batches: usize,
) -> Vec<f32> {
    let plane = rhs_plane_len(cfg, k, n);
    let mut out = Vec::with_capacity(batches * k * n);
    for b in 0..batches {
        for r in 0..k {
            for c in 0..n {
                out.push(values[b * plane + rhs_offset(cfg, k, r, c)]);
            }
        }
    }
    out
}

// ============================================================================
// Multiply + epilogue
// ============================================================================

/// Bias operand, already gathered
pub(crate) enum Bias {
    /// One row of N broadcast everywhere
    Row(Vec<f32>),
    /// Full `[batch][M][N]` matrix
    Full(Vec<f32>),
}

/// Scalars and fusions applied after accumulation
pub(crate) struct Epilogue {
    pub alpha: f32,
    pub beta: f32,
    pub activation: ActivationInfo,
    pub bias: Option<Bias>,
    /// Round each product to f16 before accumulating
    pub f16_products: bool,
}

/// Problem extents for one multiply launch
#[derive(Copy, Clone, Debug)]
pub(crate) struct Dims {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batch: usize,
    pub b_batches: usize,
}

fn compute_row(a: &[f32], b: &[f32], dims: Dims, epi: &Epilogue, index: usize, row: &mut [f32]) {
    let (batch, r) = (index / dims.m, index % dims.m);
    let b_base = if dims.b_batches == 1 {
        0
    } else {
        batch * dims.k * dims.n
    };
    let a_row = &a[(batch * dims.m + r) * dims.k..][..dims.k];

    row.fill(0.0);
    for (kk, &av) in a_row.iter().enumerate() {
        let b_row = &b[b_base + kk * dims.n..][..dims.n];
        for (acc, &bv) in row.iter_mut().zip(b_row) {
            let product = av * bv;
            *acc += if epi.f16_products {
                half::f16::from_f32(product).to_f32()
            } else {
                product
            };
        }
    }

    for (col, acc) in row.iter_mut().enumerate() {
        let mut v = epi.alpha * *acc;
        match &epi.bias {
            Some(Bias::Row(bias)) => v += epi.beta * bias[col],
            Some(Bias::Full(c)) => v += epi.beta * c[index * dims.n + col],
            None => {}
        }
        *acc = epi.activation.apply(v);
    }
}

/// `act(alpha * A x B + beta * C)` over logical operands, `[batch][M][N]`
pub(crate) fn multiply(a: &[f32], b: &[f32], dims: Dims, epi: &Epilogue) -> Vec<f32> {
    let mut out = vec![0.0f32; dims.batch * dims.m * dims.n];

    #[cfg(feature = "rayon")]
    {
        if dims.batch * dims.m >= PARALLEL_MIN_ROWS {
            out.par_chunks_mut(dims.n)
                .enumerate()
                .for_each(|(index, row)| compute_row(a, b, dims, epi, index, row));
            return out;
        }
    }

    for (index, row) in out.chunks_mut(dims.n).enumerate() {
        compute_row(a, b, dims, epi, index, row);
    }
    out
}

/// Write a `[batch][M][N]` result through the output view
pub(crate) fn scatter(out: &Bound, view: &MatrixView, result: &[f32], dims: Dims) {
    let mut values = out.values();
    let mut i = 0;
    for b in 0..dims.batch {
        for r in 0..dims.m {
            for c in 0..dims.n {
                values[view.offset(b, r, c)] = result[i];
                i += 1;
            }
        }
    }
    out.buffer.write_f32(out.info.dtype(), &values);
}

/// Gather the bias operand, if one is fused
pub(crate) fn gather_bias(c: Option<&Bound>, info: &GemmKernelInfo, batch: usize) -> Option<Bias> {
    let c = c?;
    let values = c.values();
    if info.broadcast_bias {
        let row = (0..info.n)
            .map(|i| values[c.info.logical_offset(i)])
            .collect();
        Some(Bias::Row(row))
    } else {
        let view = MatrixView::new(&c.info, info.m, true);
        Some(Bias::Full(gather(&values, &view, batch, info.m, info.n)))
    }
}

/// Build the epilogue for a multiply launch
pub(crate) fn epilogue(
    info: &GemmKernelInfo,
    alpha: f32,
    beta: f32,
    c: Option<&Bound>,
    batch: usize,
    dtype: DType,
) -> Epilogue {
    Epilogue {
        alpha,
        beta,
        activation: info.activation,
        bias: gather_bias(c, info, batch),
        f16_products: dtype == DType::F16 && !info.fp_mixed_precision,
    }
}

/// How a multiply stage reads its LHS
#[derive(Copy, Clone, Debug)]
pub(crate) enum LhsLayout {
    /// Original layout, padding honoured or assumed absent
    Original { honour_padding: bool },
    /// Output of the LHS reshape stage
    Reshaped(LhsTileConfig),
}

/// How a multiply stage reads its RHS
#[derive(Copy, Clone, Debug)]
pub(crate) enum RhsLayout {
    Original,
    Reshaped(RhsTileConfig),
}

/// Operands of one multiply launch, bound at submission time
pub(crate) struct MultiplyLaunch {
    pub lhs: Bound,
    pub rhs: Bound,
    pub c: Option<Bound>,
    pub out: Bound,
    pub alpha: f32,
    pub beta: f32,
    pub info: GemmKernelInfo,
    pub lhs_layout: LhsLayout,
    pub rhs_layout: RhsLayout,
    pub honour_out_padding: bool,
}

impl MultiplyLaunch {
    pub fn execute(self) -> Result<()> {
        let info = &self.info;
        let lhs_values = self.lhs.values();
        let rhs_values = self.rhs.values();
        let b_batches = self.rhs.info.num_planes();

        let (a, batch) = match self.lhs_layout {
            LhsLayout::Original { honour_padding } => {
                let view = MatrixView::new(&self.lhs.info, info.m, honour_padding);
                let batch = view.batches();
                (gather(&lhs_values, &view, batch, info.m, info.k), batch)
            }
            LhsLayout::Reshaped(cfg) => {
                let batch = self.lhs.info.num_planes();
                (
                    gather_reshaped_lhs(&lhs_values, &cfg, info.m, info.k, batch),
                    batch,
                )
            }
        };
        let b = match self.rhs_layout {
            RhsLayout::Original => {
                let view = MatrixView::new(&self.rhs.info, info.k, true);
                gather(&rhs_values, &view, b_batches, info.k, info.n)
            }
            RhsLayout::Reshaped(cfg) => {
                gather_reshaped_rhs(&rhs_values, &cfg, info.k, info.n, b_batches)
            }
        };

        let dims = Dims {
            m: info.m,
            n: info.n,
            k: info.k,
            batch,
            b_batches,
        };
        let epi = epilogue(
            info,
            self.alpha,
            self.beta,
            self.c.as_ref(),
            batch,
            self.out.info.dtype(),
        );
        let result = multiply(&a, &b, dims, &epi);
        let out_view = MatrixView::new(&self.out.info, info.m, self.honour_out_padding);
        scatter(&self.out, &out_view, &result, dims);
        Ok(())
    }
}

/// Bind every operand of a multiply stage
#[allow(clippy::too_many_arguments)]
pub(crate) fn bind_multiply(
    lhs: &Tensor,
    rhs: &Tensor,
    c: Option<&Tensor>,
    out: &Tensor,
    alpha: f32,
    beta: f32,
    info: GemmKernelInfo,
    lhs_layout: LhsLayout,
    rhs_layout: RhsLayout,
    honour_out_padding: bool,
) -> Result<MultiplyLaunch> {
    Ok(MultiplyLaunch {
        lhs: Bound::new(lhs)?,
        rhs: Bound::new(rhs)?,
        c: c.map(Bound::new).transpose()?,
        out: Bound::new(out)?,
        alpha,
        beta,
        info,
        lhs_layout,
        rhs_layout,
        honour_out_padding,
    })
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Multiply stages only compute in floating point
pub(crate) fn check_float(dtype: DType, op: &'static str) -> Result<()> {
    if dtype.is_float() {
        Ok(())
    } else {
        Err(Error::unsupported_dtype(dtype, op))
    }
}

pub(crate) fn check_same_dtype(lhs: &TensorInfo, rhs: &TensorInfo) -> Result<()> {
    if lhs.dtype() != rhs.dtype() {
        return Err(Error::DTypeMismatch {
            lhs: lhs.dtype(),
            rhs: rhs.dtype(),
        });
    }
    Ok(())
}

pub(crate) fn check_shape(expected: &[usize], got: &TensorInfo) -> Result<()> {
    if got.shape().as_slice() != expected {
        return Err(Error::shape_mismatch(expected, got.shape()));
    }
    Ok(())
}

/// Output and optional bias checks every multiply stage shares
pub(crate) fn check_output_and_bias(
    lhs: &TensorInfo,
    c: Option<&TensorInfo>,
    out: &TensorInfo,
    info: &GemmKernelInfo,
    batch: usize,
) -> Result<()> {
    check_same_dtype(lhs, out)?;
    let out_view = MatrixView::new(out, info.m, true);
    let rows = out.rows() * out_view.planes_per_batch;
    if out.cols() != info.n || rows != info.m || out_view.batches() != batch {
        return Err(Error::invalid_argument(
            "output",
            format!(
                "{:?} cannot hold {batch} x {} x {} results",
                out.shape(),
                info.m,
                info.n
            ),
        ));
    }
    if let Some(c) = c {
        check_same_dtype(lhs, c)?;
        if info.broadcast_bias {
            if c.numel() != info.n {
                return Err(Error::shape_mismatch(&[info.n], c.shape()));
            }
        } else {
            check_shape(out.shape(), c)?;
        }
    }
    Ok(())
}
