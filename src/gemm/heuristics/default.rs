//! Fixed per-architecture heuristics
//!
//! Every configuration returned here satisfies the kernel constraints for
//! F32 and F16 at any problem size, so the default tier can be committed
//! without validation.

use crate::dtype::DType;
use crate::gemm::query::ProblemQuery;
use crate::gemm::strategy::GemmStrategy;
use crate::gemm::tiling::{LhsTileConfig, RhsTileConfig};
use crate::runtime::{GpuArch, GpuTarget};

// ============================================================================
// Strategy tables
// ============================================================================

/// Default strategy for a problem
pub fn strategy(q: &ProblemQuery) -> GemmStrategy {
    if !q.dtype.is_float() {
        return GemmStrategy::Native;
    }
    match (q.arch(), q.target, q.dtype) {
        (GpuArch::Midgard, _, _) => midgard_strategy(q),
        (GpuArch::Bifrost, GpuTarget::G76, DType::F32) => g76_f32_strategy(q),
        (GpuArch::Bifrost, _, DType::F16) => bifrost_f16_strategy(q),
        (GpuArch::Bifrost, _, _) => bifrost_f32_strategy(q),
        (GpuArch::Valhall, _, DType::F16) => valhall_f16_strategy(q),
        (GpuArch::Valhall, _, _) => valhall_f32_strategy(q),
    }
}

fn midgard_strategy(q: &ProblemQuery) -> GemmStrategy {
    if q.reshape_rhs_once && q.m != 1 {
        GemmStrategy::ReshapedV1
    } else {
        GemmStrategy::Native
    }
}

fn bifrost_f32_strategy(q: &ProblemQuery) -> GemmStrategy {
    let (m, n, k) = (q.m, q.n, q.k);
    if !q.reshape_rhs_once {
        return GemmStrategy::Native;
    }
    if m == 1 {
        return GemmStrategy::ReshapedOnlyRhs;
    }
    if n < 16 {
        return GemmStrategy::ReshapedV1;
    }
    if k > 256 && m > 4 {
        // long reductions on skinny problems favour streaming A in place
        if k / m > 4 || k / n > 4 {
            return GemmStrategy::ReshapedOnlyRhs;
        }
    }
    GemmStrategy::Reshaped
}

fn bifrost_f16_strategy(q: &ProblemQuery) -> GemmStrategy {
    if !q.reshape_rhs_once {
        return GemmStrategy::Native;
    }
    if q.m == 1 {
        return GemmStrategy::ReshapedOnlyRhs;
    }
    if q.n < 16 {
        return GemmStrategy::ReshapedV1;
    }
    if q.m * q.n > 128 * 128 {
        GemmStrategy::Reshaped
    } else {
        GemmStrategy::ReshapedOnlyRhs
    }
}

fn g76_f32_strategy(q: &ProblemQuery) -> GemmStrategy {
    let (m, n, k) = (q.m, q.n, q.k);
    if !q.reshape_rhs_once {
        return GemmStrategy::Native;
    }
    if m == 1 {
        return GemmStrategy::ReshapedOnlyRhs;
    }
    if k <= 496 {
        if n <= 544 {
            GemmStrategy::ReshapedOnlyRhs
        } else {
            GemmStrategy::Reshaped
        }
    } else if k <= 552 {
        if m <= 148 {
            GemmStrategy::ReshapedOnlyRhs
        } else if m <= 278 {
            GemmStrategy::Reshaped
        } else {
            GemmStrategy::ReshapedOnlyRhs
        }
    } else if k <= 588 {
        GemmStrategy::ReshapedOnlyRhs
    } else {
        GemmStrategy::Reshaped
    }
}

fn valhall_f32_strategy(q: &ProblemQuery) -> GemmStrategy {
    if q.reshape_rhs_once {
        GemmStrategy::ReshapedOnlyRhs
    } else {
        GemmStrategy::Native
    }
}

fn valhall_f16_strategy(q: &ProblemQuery) -> GemmStrategy {
    if !q.reshape_rhs_once {
        GemmStrategy::Native
    } else if q.k > 1024 && q.m > 1 {
        GemmStrategy::Reshaped
    } else {
        GemmStrategy::ReshapedOnlyRhs
    }
}

// ============================================================================
// Tile configuration tables
// ============================================================================

/// Tile parameters in table order:
/// `(m0, n0, k0, v0, h0, lhs_interleave, rhs_interleave, lhs_transpose, rhs_transpose)`
type TileRow = (usize, usize, usize, usize, usize, bool, bool, bool, bool);

/// Build configs from a table row, clamping block counts to the problem
fn configure_tiles(q: &ProblemQuery, row: TileRow) -> (LhsTileConfig, RhsTileConfig) {
    let (m0, n0, k0, v0, h0, lhs_interleave, rhs_interleave, lhs_transpose, rhs_transpose) = row;
    let m0 = m0.min(q.m.max(1));
    let lhs = LhsTileConfig {
        m0,
        k0,
        v0: v0.clamp(1, q.m.div_ceil(m0).max(1)),
        interleave: lhs_interleave,
        transpose: lhs_transpose,
    };
    let rhs = RhsTileConfig {
        n0,
        k0,
        h0: h0.clamp(1, q.n.div_ceil(n0).max(1)),
        interleave: rhs_interleave,
        transpose: rhs_transpose,
    };
    (lhs, rhs)
}

/// Default tiling for the reshaped (V2) strategy
pub fn config_reshaped(q: &ProblemQuery) -> (LhsTileConfig, RhsTileConfig) {
    let row: TileRow = match (q.target, q.arch(), q.dtype) {
        (GpuTarget::G76, _, DType::F16) => (4, 4, 8, 4, 2, true, true, true, false),
        (GpuTarget::G76, _, _) if q.n <= 4 => (4, 2, 8, 16, 16, true, false, false, true),
        (GpuTarget::G76, _, _) => (4, 4, 2, 8, 16, false, false, false, true),
        (_, GpuArch::Valhall, DType::F16) => (4, 8, 8, 1, 4, false, false, false, true),
        (_, GpuArch::Valhall, _) => (4, 4, 4, 2, 8, false, false, false, true),
        (_, _, DType::F16) if q.n <= 4 => (4, 2, 8, 8, 2, true, true, true, false),
        (_, _, DType::F16) => (4, 8, 4, 4, 2, true, true, true, false),
        _ if q.n <= 4 => (4, 2, 8, 16, 16, true, false, false, true),
        _ => (5, 4, 4, 2, 16, false, true, false, true),
    };
    configure_tiles(q, row)
}

/// Default tiling for the reshaped-RHS-only strategy
///
/// The LHS config only carries `m0`/`k0`; A is never reshaped.
pub fn config_reshaped_only_rhs(q: &ProblemQuery) -> (LhsTileConfig, RhsTileConfig) {
    let gemv = q.m == 1;
    let row: TileRow = match (q.target, q.arch(), q.dtype) {
        (_, GpuArch::Valhall, DType::F16) if gemv => (1, 4, 16, 1, 8, false, false, false, true),
        (_, GpuArch::Valhall, DType::F16) => (4, 8, 8, 1, 4, false, false, false, true),
        (_, GpuArch::Valhall, _) if gemv => (1, 4, 8, 1, 16, false, false, false, true),
        (_, GpuArch::Valhall, _) => (4, 4, 4, 1, 8, false, false, false, true),
        (GpuTarget::G76, _, DType::F32) if gemv => (1, 2, 8, 1, 16, false, true, false, true),
        (GpuTarget::G76, _, DType::F32) => (4, 4, 8, 1, 2, false, true, false, true),
        (_, _, DType::F16) if gemv => (1, 4, 16, 1, 4, false, true, false, true),
        (_, _, DType::F16) => (4, 4, 8, 1, 4, false, true, false, true),
        _ if gemv => (1, 2, 8, 1, 8, false, true, false, true),
        _ => (4, 4, 4, 1, 2, false, true, false, true),
    };
    configure_tiles(q, row)
}
