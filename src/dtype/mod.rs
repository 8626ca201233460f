//! Element types understood by the planner
//!
//! The planner itself only needs an element's byte size and whether it is a
//! floating point type; the host reference kernels additionally map each
//! `DType` onto a concrete Rust type through [`Element`].

mod element;

pub use element::Element;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum width of one vector load/store in bytes.
///
/// Tile parameters that describe a vector access (`k0`, or `m0`/`n0` when a
/// block is transposed) are bounded by `VECTOR_REGISTER_BYTES / element_size`.
pub const VECTOR_REGISTER_BYTES: usize = 32;

/// Element type of a tensor
///
/// # Discriminant Values (Serialization Stability)
///
/// - Floats: 0-9 (F32=1, F16=2)
/// - Signed ints: 10-19 (I32=11)
/// - Unsigned ints: 20-29 (U8=23)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DType {
    /// 32-bit floating point
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,
    /// 32-bit signed integer
    I32 = 11,
    /// 8-bit unsigned integer (quantized operands)
    U8 = 23,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 => 2,
            Self::U8 => 1,
        }
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16)
    }

    /// Widest vector (in elements) one load may cover for this type
    #[inline]
    pub const fn max_vector_width(self) -> usize {
        VECTOR_REGISTER_BYTES / self.size_in_bytes()
    }

    /// Short name for display
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I32 => "i32",
            Self::U8 => "u8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Dispatch on a runtime `DType`, binding the matching Rust element type.
///
/// ```ignore
/// dispatch_dtype!(dtype, T => { buffer.read::<T>() }, "read")
/// ```
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block) => {
        match $dtype {
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F16 => {
                type $T = half::f16;
                $body
            }
            $crate::dtype::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::U8 => {
                type $T = u8;
                $body
            }
        }
    };
}

pub(crate) use dispatch_dtype;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::U8.size_in_bytes(), 1);
        assert_eq!(DType::F16.max_vector_width(), 16);
        assert_eq!(DType::F32.max_vector_width(), 8);
    }

    #[test]
    fn test_serde_names() {
        let dt: DType = serde_json::from_str("\"f16\"").unwrap();
        assert_eq!(dt, DType::F16);
        assert_eq!(serde_json::to_string(&DType::I32).unwrap(), "\"i32\"");
    }

    #[test]
    fn test_dispatch_binds_element_size() {
        for dtype in [DType::F32, DType::F16, DType::I32, DType::U8] {
            let size = dispatch_dtype!(dtype, T => { std::mem::size_of::<T>() });
            assert_eq!(size, dtype.size_in_bytes());
        }
    }
}
