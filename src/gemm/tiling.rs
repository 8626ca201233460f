//! Tile configurations and reshaped operand geometry
//!
//! Reshape stages rewrite an operand into blocks so the multiply kernel can
//! read each block with vector loads.
//!
//! # LHS layout
//!
//! A is cut into `m0 x k0` blocks. Block `(mb, kb)` lands in output row
//! `mb / v0`; `v0` consecutive block-rows share one output row, either
//! interleaved block by block along K or laid out as contiguous strips:
//!
//! ```text
//! interleave:    [ b(0,0) b(1,0) | b(0,1) b(1,1) | ... ]   (v0 = 2)
//! no interleave: [ b(0,0) b(0,1) ... | b(1,0) b(1,1) ... ]
//! ```
//!
//! Inside a block elements are row-major (`m0` rows of `k0`), or
//! column-major when `transpose` is set.
//!
//! # RHS layout
//!
//! B is cut into `k0 x n0` blocks with `h0` playing the role of `v0`;
//! `transpose` stores each block as `n0` rows of `k0`.
//!
//! Elements past M, N or K are zero-filled, so every block is complete.

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::tensor::{Shape, TensorInfo};
use serde::{Deserialize, Serialize};

/// Accepted LHS `k0` values
pub const LHS_K0_VALUES: [usize; 5] = [2, 3, 4, 8, 16];
/// Accepted RHS `k0` values
pub const RHS_K0_VALUES: [usize; 6] = [1, 2, 3, 4, 8, 16];
/// Accepted RHS `n0` values
pub const RHS_N0_VALUES: [usize; 5] = [2, 3, 4, 8, 16];
/// Largest LHS `m0`
pub const MAX_M0: usize = 8;

// ============================================================================
// Tile configurations
// ============================================================================

/// Tiling of the reshaped LHS operand
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LhsTileConfig {
    /// Rows per block
    pub m0: usize,
    /// Reduction elements per block
    pub k0: usize,
    /// Block-rows sharing one reshaped row
    pub v0: usize,
    /// Interleave blocks of a reshaped row along K
    #[serde(default)]
    pub interleave: bool,
    /// Store blocks column-major
    #[serde(default)]
    pub transpose: bool,
}

impl Default for LhsTileConfig {
    fn default() -> Self {
        Self {
            m0: 4,
            k0: 4,
            v0: 1,
            interleave: false,
            transpose: false,
        }
    }
}

impl LhsTileConfig {
    /// Elements per block
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.m0 * self.k0
    }

    /// Check block sizes against the kernel constraints for `dtype`
    pub fn validate(&self, dtype: DType) -> Result<()> {
        const STAGE: &str = "reshape_lhs";
        if self.m0 == 0 || self.m0 > MAX_M0 {
            return Err(Error::invalid_tile(
                STAGE,
                format!("m0 ({}) must be in 1..={MAX_M0}", self.m0),
            ));
        }
        if !LHS_K0_VALUES.contains(&self.k0) {
            return Err(Error::invalid_tile(
                STAGE,
                format!("k0 ({}) must be one of {LHS_K0_VALUES:?}", self.k0),
            ));
        }
        if self.v0 == 0 {
            return Err(Error::invalid_tile(STAGE, "v0 must be at least 1"));
        }
        let vector = if self.transpose { self.m0 } else { self.k0 };
        if vector > dtype.max_vector_width() {
            return Err(Error::invalid_tile(
                STAGE,
                format!("vector of {vector} {dtype} elements exceeds a register"),
            ));
        }
        Ok(())
    }
}

/// Tiling of the reshaped RHS operand
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RhsTileConfig {
    /// Columns per block
    pub n0: usize,
    /// Reduction elements per block
    pub k0: usize,
    /// Block-columns sharing one reshaped row
    pub h0: usize,
    /// Interleave blocks of a reshaped row along K
    #[serde(default)]
    pub interleave: bool,
    /// Store blocks column-major
    #[serde(default)]
    pub transpose: bool,
}

impl Default for RhsTileConfig {
    fn default() -> Self {
        Self {
            n0: 4,
            k0: 4,
            h0: 1,
            interleave: false,
            transpose: false,
        }
    }
}

impl RhsTileConfig {
    /// Elements per block
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.n0 * self.k0
    }

    /// Check block sizes against the kernel constraints for `dtype`
    pub fn validate(&self, dtype: DType) -> Result<()> {
        const STAGE: &str = "reshape_rhs";
        if !RHS_N0_VALUES.contains(&self.n0) {
            return Err(Error::invalid_tile(
                STAGE,
                format!("n0 ({}) must be one of {RHS_N0_VALUES:?}", self.n0),
            ));
        }
        if !RHS_K0_VALUES.contains(&self.k0) {
            return Err(Error::invalid_tile(
                STAGE,
                format!("k0 ({}) must be one of {RHS_K0_VALUES:?}", self.k0),
            ));
        }
        if self.h0 == 0 {
            return Err(Error::invalid_tile(STAGE, "h0 must be at least 1"));
        }
        let vector = if self.transpose { self.k0 } else { self.n0 };
        if vector > dtype.max_vector_width() {
            return Err(Error::invalid_tile(
                STAGE,
                format!("vector of {vector} {dtype} elements exceeds a register"),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Operand geometry
// ============================================================================

/// `(M, K, batch)` of an LHS operand
///
/// With 3D reinterpretation the depth dimension folds into M.
pub fn lhs_dims(a: &TensorInfo, reinterpret_as_3d: bool) -> (usize, usize, usize) {
    let depth = if reinterpret_as_3d {
        a.shape().from_back(2)
    } else {
        1
    };
    let m = a.rows() * depth;
    let batch = a.num_planes() / depth.max(1);
    (m, a.cols(), batch)
}

/// `(K, N, batch)` of an RHS operand
pub fn rhs_dims(b: &TensorInfo) -> (usize, usize, usize) {
    (b.rows(), b.cols(), b.num_planes())
}

/// Shape `[batch, height, width]` the LHS reshape produces
pub fn compute_lhs_reshaped_shape(
    a: &TensorInfo,
    cfg: &LhsTileConfig,
    reinterpret_as_3d: bool,
) -> Shape {
    let (m, k, batch) = lhs_dims(a, reinterpret_as_3d);
    lhs_reshaped_shape(cfg, m, k, batch)
}

/// Shape `[batch, height, width]` the RHS reshape produces
pub fn compute_rhs_reshaped_shape(b: &TensorInfo, cfg: &RhsTileConfig) -> Shape {
    let (k, n, batch) = rhs_dims(b);
    rhs_reshaped_shape(cfg, k, n, batch)
}

/// Reshaped LHS shape for an `m x k` problem with `batch` matrices
pub fn lhs_reshaped_shape(cfg: &LhsTileConfig, m: usize, k: usize, batch: usize) -> Shape {
    let (height, width) = lhs_reshaped_extent(cfg, m, k);
    Shape::from([batch, height, width])
}

/// Reshaped RHS shape for a `k x n` operand with `batch` matrices
pub fn rhs_reshaped_shape(cfg: &RhsTileConfig, k: usize, n: usize, batch: usize) -> Shape {
    let (height, width) = rhs_reshaped_extent(cfg, k, n);
    Shape::from([batch, height, width])
}

fn lhs_reshaped_extent(cfg: &LhsTileConfig, m: usize, k: usize) -> (usize, usize) {
    let width = cfg.block_size() * k.div_ceil(cfg.k0) * cfg.v0;
    let height = m.div_ceil(cfg.m0).div_ceil(cfg.v0);
    (height, width)
}

fn rhs_reshaped_extent(cfg: &RhsTileConfig, k: usize, n: usize) -> (usize, usize) {
    let width = cfg.block_size() * k.div_ceil(cfg.k0) * cfg.h0;
    let height = n.div_ceil(cfg.n0).div_ceil(cfg.h0);
    (height, width)
}

/// Elements in one batch plane of the reshaped LHS
pub fn lhs_plane_len(cfg: &LhsTileConfig, m: usize, k: usize) -> usize {
    let (h, w) = lhs_reshaped_extent(cfg, m, k);
    h * w
}

/// Elements in one batch plane of the reshaped RHS
pub fn rhs_plane_len(cfg: &RhsTileConfig, k: usize, n: usize) -> usize {
    let (h, w) = rhs_reshaped_extent(cfg, k, n);
    h * w
}

#[inline]
fn block_offset(
    outer: usize,
    wrap: usize,
    kb: usize,
    num_kb: usize,
    interleave: bool,
    block: usize,
) -> usize {
    let (out_row, slot) = (outer / wrap, outer % wrap);
    let block_index = if interleave {
        kb * wrap + slot
    } else {
        slot * num_kb + kb
    };
    out_row * block * num_kb * wrap + block_index * block
}

/// Offset of `A[row, col]` inside one batch plane of the reshaped LHS
#[inline]
pub fn lhs_offset(cfg: &LhsTileConfig, k: usize, row: usize, col: usize) -> usize {
    let (r, c) = (row % cfg.m0, col % cfg.k0);
    let within = if cfg.transpose {
        c * cfg.m0 + r
    } else {
        r * cfg.k0 + c
    };
    let base = block_offset(
        row / cfg.m0,
        cfg.v0,
        col / cfg.k0,
        k.div_ceil(cfg.k0),
        cfg.interleave,
        cfg.block_size(),
    );
    base + within
}

/// Offset of `B[row, col]` inside one batch plane of the reshaped RHS
#[inline]
pub fn rhs_offset(cfg: &RhsTileConfig, k: usize, row: usize, col: usize) -> usize {
    let (r, c) = (row % cfg.k0, col % cfg.n0);
    let within = if cfg.transpose {
        c * cfg.k0 + r
    } else {
        r * cfg.n0 + c
    };
    let base = block_offset(
        col / cfg.n0,
        cfg.h0,
        row / cfg.k0,
        k.div_ceil(cfg.k0),
        cfg.interleave,
        cfg.block_size(),
    );
    base + within
}
