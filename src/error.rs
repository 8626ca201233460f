//! Error types for gemmkit

use crate::dtype::DType;
use thiserror::Error;

/// Result type alias using gemmkit's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning or executing a GEMM
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch between an operand and what the operation expects
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Unsupported dtype for an operation
    #[error("Unsupported dtype {dtype:?} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// DType mismatch between operands
    #[error("DType mismatch: {lhs:?} vs {rhs:?}")]
    DTypeMismatch {
        /// Left-hand side dtype
        lhs: DType,
        /// Right-hand side dtype
        rhs: DType,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Tile configuration rejected by a stage
    #[error("Invalid tile configuration for {stage}: {reason}")]
    InvalidTileConfig {
        /// The stage that rejected the configuration
        stage: &'static str,
        /// Reason for rejection
        reason: String,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// A kernel was launched with a tensor that has no backing buffer
    #[error("{tensor} has no backing buffer")]
    NotAllocated {
        /// Display form of the tensor id
        tensor: String,
    },

    /// `prepare`/`run` called before `configure`
    #[error("GEMM has not been configured")]
    NotConfigured,

    /// `configure` called twice on the same instance
    #[error("GEMM is already configured")]
    AlreadyConfigured,

    /// Device-side failure reported by the command queue
    #[error("Device error: {0}")]
    Device(String),

    /// Malformed learned heuristics table
    #[error("Heuristics error: {0}")]
    Heuristics(String),

    /// I/O failure while loading a heuristics table
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding failure while loading a heuristics table
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: DType, op: &'static str) -> Self {
        Self::UnsupportedDType { dtype, op }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an invalid tile configuration error
    pub fn invalid_tile(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidTileConfig {
            stage,
            reason: reason.into(),
        }
    }
}
