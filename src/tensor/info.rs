//! Tensor metadata: shape, element type and cross-plane padding
//!
//! # Memory layout
//!
//! A tensor is stored as a stack of 2D planes (the last two dimensions).
//! Each plane may carry extra unused rows above and below it:
//!
//! ```text
//!          ┌──────── cols ────────┐
//! plane 0  │ top padding rows     │
//!          │ rows 0..rows         │
//!          │ bottom padding rows  │
//! plane 1  │ top padding rows     │
//!          │ ...                  │
//! ```
//!
//! The element at `(plane, row, col)` lives at
//! `(plane * (top + rows + bottom) + top + row) * cols + col`.

use super::Shape;
use crate::dtype::DType;

/// Extra unused rows above and below every 2D plane of a buffer
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Padding {
    /// Rows above each plane
    pub top: usize,
    /// Rows below each plane
    pub bottom: usize,
}

impl Padding {
    /// No padding
    pub const NONE: Padding = Padding { top: 0, bottom: 0 };

    /// Create padding with the given top/bottom rows
    pub const fn new(top: usize, bottom: usize) -> Self {
        Self { top, bottom }
    }

    /// Total rows of padding per plane
    #[inline]
    pub const fn cross_plane(&self) -> usize {
        self.top + self.bottom
    }
}

/// Shape, element type and padding of a tensor
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorInfo {
    shape: Shape,
    dtype: DType,
    padding: Padding,
}

impl TensorInfo {
    /// Create an unpadded tensor info
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
            padding: Padding::NONE,
        }
    }

    /// Builder: set cross-plane padding
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Same element type with a different shape and no padding
    pub fn clone_with_shape(&self, shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            dtype: self.dtype,
            padding: Padding::NONE,
        }
    }

    /// Tensor shape
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Cross-plane padding
    #[inline]
    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub(crate) fn set_padding(&mut self, padding: Padding) {
        self.padding = padding;
    }

    /// Size of one element in bytes
    #[inline]
    pub fn element_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Innermost dimension
    #[inline]
    pub fn cols(&self) -> usize {
        self.shape.from_back(0)
    }

    /// Rows of one 2D plane
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape.from_back(1)
    }

    /// Number of 2D planes (product of every dimension but the last two)
    pub fn num_planes(&self) -> usize {
        let n = self.shape.ndim();
        self.shape[..n.saturating_sub(2)].iter().product()
    }

    /// Logical element count
    #[inline]
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Elements the backing buffer must hold, padding included
    pub fn storage_elements(&self) -> usize {
        self.num_planes() * (self.rows() + self.padding.cross_plane()) * self.cols()
    }

    /// Bytes the backing buffer must hold, padding included
    pub fn storage_bytes(&self) -> usize {
        self.storage_elements() * self.element_size()
    }

    /// Buffer offset (in elements) of `(plane, row, col)`
    #[inline]
    pub fn offset(&self, plane: usize, row: usize, col: usize) -> usize {
        let padded_rows = self.rows() + self.padding.cross_plane();
        (plane * padded_rows + self.padding.top + row) * self.cols() + col
    }

    /// Buffer offset of the `index`-th logical element in row-major order
    #[inline]
    pub fn logical_offset(&self, index: usize) -> usize {
        let cols = self.cols().max(1);
        let rows = self.rows().max(1);
        let col = index % cols;
        let row = (index / cols) % rows;
        let plane = index / (cols * rows);
        self.offset(plane, row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_geometry() {
        let info = TensorInfo::new([2, 3, 4, 5], DType::F32);
        assert_eq!(info.cols(), 5);
        assert_eq!(info.rows(), 4);
        assert_eq!(info.num_planes(), 6);
        assert_eq!(info.storage_elements(), 120);
    }

    #[test]
    fn test_padded_offsets() {
        let info = TensorInfo::new([2, 3, 4], DType::F32).with_padding(Padding::new(1, 2));
        // each plane occupies 6 rows of 4
        assert_eq!(info.storage_elements(), 2 * 6 * 4);
        assert_eq!(info.offset(0, 0, 0), 4);
        assert_eq!(info.offset(1, 2, 3), (6 + 1 + 2) * 4 + 3);
        assert_eq!(info.logical_offset(3 * 4), info.offset(1, 0, 0));
    }

    #[test]
    fn test_vector_is_one_row() {
        let info = TensorInfo::new([7], DType::F16);
        assert_eq!(info.rows(), 1);
        assert_eq!(info.cols(), 7);
        assert_eq!(info.num_planes(), 1);
        assert_eq!(info.storage_bytes(), 14);
    }

    #[test]
    fn test_clone_with_shape_drops_padding() {
        let info = TensorInfo::new([4, 4], DType::F16).with_padding(Padding::new(1, 1));
        let reshaped = info.clone_with_shape([1, 2, 32]);
        assert_eq!(reshaped.padding(), Padding::NONE);
        assert_eq!(reshaped.dtype(), DType::F16);
    }
}
