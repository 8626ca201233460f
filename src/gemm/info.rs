//! Caller-facing GEMM options and the kernel descriptor derived from them

use super::tiling::{LhsTileConfig, RhsTileConfig};
use serde::{Deserialize, Serialize};

/// Activation fused into the multiply epilogue
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationInfo {
    /// `x`
    #[default]
    Identity,
    /// `max(0, x)`
    Relu,
    /// `min(a, max(0, x))`
    BoundedRelu {
        /// Upper bound
        a: f32,
    },
    /// `min(a, max(b, x))`
    LuBoundedRelu {
        /// Upper bound
        a: f32,
        /// Lower bound
        b: f32,
    },
    /// `1 / (1 + exp(-x))`
    Logistic,
    /// `a * tanh(b * x)`
    Tanh {
        /// Output scale
        a: f32,
        /// Input scale
        b: f32,
    },
}

impl ActivationInfo {
    /// Apply the activation to one value
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Identity => x,
            Self::Relu => x.max(0.0),
            Self::BoundedRelu { a } => x.max(0.0).min(a),
            Self::LuBoundedRelu { a, b } => x.max(b).min(a),
            Self::Logistic => 1.0 / (1.0 + (-x).exp()),
            Self::Tanh { a, b } => a * (b * x).tanh(),
        }
    }

    /// Whether the activation leaves values unchanged
    pub fn is_identity(self) -> bool {
        matches!(self, Self::Identity)
    }
}

/// Options for one GEMM configuration
///
/// ```
/// use gemmkit::gemm::{ActivationInfo, GemmInfo};
///
/// let info = GemmInfo::default()
///     .with_reshape_rhs_once(true)
///     .with_activation(ActivationInfo::Relu);
/// assert!(info.reshape_rhs_once);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GemmInfo {
    /// The RHS operand is constant across runs: reshape it once in `prepare`
    pub reshape_rhs_once: bool,
    /// Treat A as `[batch, depth, height, K]` with `M = depth * height`
    pub reinterpret_input_as_3d: bool,
    /// Write the output as `[batch, depth, M / depth, N]` (0 = disabled)
    pub depth_output_gemm3d: usize,
    /// C is a single `N`-wide row broadcast over every output row
    pub broadcast_bias: bool,
    /// Activation applied after the bias
    pub activation: ActivationInfo,
    /// Reshaped weights are already populated; start prepared
    pub retain_internal_weights: bool,
    /// Accumulate F16 products in F32
    pub fp_mixed_precision: bool,
}

impl GemmInfo {
    /// Builder: set the reshape-RHS-once flag
    pub fn with_reshape_rhs_once(mut self, value: bool) -> Self {
        self.reshape_rhs_once = value;
        self
    }

    /// Builder: reinterpret A as a 3D tensor
    pub fn with_reinterpret_input_as_3d(mut self, value: bool) -> Self {
        self.reinterpret_input_as_3d = value;
        self
    }

    /// Builder: reinterpret the output as 3D with the given depth
    pub fn with_depth_output_gemm3d(mut self, depth: usize) -> Self {
        self.depth_output_gemm3d = depth;
        self
    }

    /// Builder: broadcast C as a bias row
    pub fn with_broadcast_bias(mut self, value: bool) -> Self {
        self.broadcast_bias = value;
        self
    }

    /// Builder: fused activation
    pub fn with_activation(mut self, activation: ActivationInfo) -> Self {
        self.activation = activation;
        self
    }

    /// Builder: retain internal weights
    pub fn with_retain_internal_weights(mut self, value: bool) -> Self {
        self.retain_internal_weights = value;
        self
    }

    /// Builder: F16 mixed precision accumulation
    pub fn with_fp_mixed_precision(mut self, value: bool) -> Self {
        self.fp_mixed_precision = value;
        self
    }
}

/// Everything a multiply stage needs besides its operands
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GemmKernelInfo {
    /// Output rows per batch
    pub m: usize,
    /// Output columns
    pub n: usize,
    /// Reduction depth
    pub k: usize,
    /// Output 3D depth (0 = disabled)
    pub depth_output_gemm3d: usize,
    /// A is reinterpreted as 3D
    pub reinterpret_input_as_3d: bool,
    /// C is broadcast as a bias row
    pub broadcast_bias: bool,
    /// F16 products accumulated in F32
    pub fp_mixed_precision: bool,
    /// Fused activation
    pub activation: ActivationInfo,
    /// LHS tiling (reshaping strategies only)
    pub lhs: LhsTileConfig,
    /// RHS tiling (reshaping strategies only)
    pub rhs: RhsTileConfig,
}

impl GemmKernelInfo {
    /// Descriptor for an `m x n x k` problem with default tiling
    pub fn new(m: usize, n: usize, k: usize, info: &GemmInfo) -> Self {
        Self {
            m,
            n,
            k,
            depth_output_gemm3d: info.depth_output_gemm3d,
            reinterpret_input_as_3d: info.reinterpret_input_as_3d,
            broadcast_bias: info.broadcast_bias,
            fp_mixed_precision: info.fp_mixed_precision,
            activation: info.activation,
            lhs: LhsTileConfig::default(),
            rhs: RhsTileConfig::default(),
        }
    }

    /// Same descriptor with the given tile configurations
    pub fn with_tiles(mut self, lhs: LhsTileConfig, rhs: RhsTileConfig) -> Self {
        self.lhs = lhs;
        self.rhs = rhs;
        self
    }
}
