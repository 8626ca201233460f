//! Core Tensor type

use super::{DeviceBuffer, Padding, Shape, TensorId, TensorInfo};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::Allocator;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared handle to a device tensor
///
/// `Tensor` is cheap to clone; clones share identity, metadata and the
/// backing buffer. It consists of:
/// - **Id**: process-unique identity (the weights cache key)
/// - **Info**: shape, dtype and cross-plane padding
/// - **Buffer**: optional device memory, bound lazily
///
/// # Allocation
///
/// Tensors created with [`Tensor::new`] have no buffer until
/// [`Tensor::allocate`] is called. Kernels bind the buffer that is current
/// when they are enqueued, so a tensor may be freed or reallocated between
/// runs without affecting work already submitted.
///
/// # Example
///
/// ```ignore
/// let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2])?;
/// assert_eq!(a.to_vec::<f32>()?, vec![1.0, 2.0, 3.0, 4.0]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<TensorInner>,
}

struct TensorInner {
    id: TensorId,
    info: RwLock<TensorInfo>,
    buffer: RwLock<Option<Arc<DeviceBuffer>>>,
    /// Cleared once a consumer no longer reads this tensor
    used: AtomicBool,
}

impl Tensor {
    /// Create a tensor without backing memory
    pub fn new(info: TensorInfo) -> Self {
        Self {
            inner: Arc::new(TensorInner {
                id: TensorId::new(),
                info: RwLock::new(info),
                buffer: RwLock::new(None),
                used: AtomicBool::new(true),
            }),
        }
    }

    /// Create an allocated tensor from a slice of data
    ///
    /// Returns an error if `data.len()` does not equal the product of the
    /// `shape` dimensions.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        let tensor = Self::new(TensorInfo::new(shape, T::DTYPE));
        let buffer = DeviceBuffer::new(data.len() * T::DTYPE.size_in_bytes());
        buffer.write(data);
        *tensor.inner.buffer.write() = Some(Arc::new(buffer));
        Ok(tensor)
    }

    /// Create an allocated tensor filled with zeros
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let info = TensorInfo::new(shape, dtype);
        let buffer = DeviceBuffer::new(info.storage_bytes());
        let tensor = Self::new(info);
        *tensor.inner.buffer.write() = Some(Arc::new(buffer));
        tensor
    }

    /// Unique identity shared by all clones of this handle
    #[inline]
    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    /// Snapshot of the current metadata
    pub fn info(&self) -> TensorInfo {
        self.inner.info.read().clone()
    }

    /// Tensor shape
    pub fn shape(&self) -> Shape {
        self.inner.info.read().shape().clone()
    }

    /// Element type
    pub fn dtype(&self) -> DType {
        self.inner.info.read().dtype()
    }

    /// Current cross-plane padding
    pub fn padding(&self) -> Padding {
        self.inner.info.read().padding()
    }

    /// Whether a buffer is bound
    pub fn is_allocated(&self) -> bool {
        self.inner.buffer.read().is_some()
    }

    /// Bind a buffer from `allocator` if none is bound yet
    pub fn allocate(&self, allocator: &dyn Allocator) -> Result<()> {
        let mut slot = self.inner.buffer.write();
        if slot.is_none() {
            let size = self.inner.info.read().storage_bytes();
            *slot = Some(allocator.allocate(size)?);
        }
        Ok(())
    }

    /// Drop this handle's reference to its buffer
    pub fn free(&self) {
        self.inner.buffer.write().take();
    }

    /// Current buffer together with the metadata describing it
    pub fn bind(&self) -> Result<(TensorInfo, Arc<DeviceBuffer>)> {
        // buffer lock first: set_padding takes it before the info lock
        let buffer = self.inner.buffer.read();
        let info = self.inner.info.read().clone();
        match buffer.as_ref() {
            Some(buf) => Ok((info, buf.clone())),
            None => Err(Error::NotAllocated {
                tensor: self.id().to_string(),
            }),
        }
    }

    /// Copy the logical contents out (padding rows skipped)
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let (info, buffer) = self.bind()?;
        if info.dtype() != T::DTYPE {
            return Err(Error::DTypeMismatch {
                lhs: info.dtype(),
                rhs: T::DTYPE,
            });
        }
        let raw = buffer.read::<T>();
        Ok((0..info.numel())
            .map(|i| raw[info.logical_offset(i)])
            .collect())
    }

    /// Logical contents widened to f32
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let (info, buffer) = self.bind()?;
        let raw = buffer.read_f32(info.dtype());
        Ok((0..info.numel())
            .map(|i| raw[info.logical_offset(i)])
            .collect())
    }

    /// Overwrite the logical contents, leaving padding rows untouched
    pub fn write_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        let (info, buffer) = self.bind()?;
        if info.dtype() != T::DTYPE {
            return Err(Error::DTypeMismatch {
                lhs: info.dtype(),
                rhs: T::DTYPE,
            });
        }
        if data.len() != info.numel() {
            return Err(Error::shape_mismatch(info.shape(), &[data.len()]));
        }
        let mut raw = buffer.read::<T>();
        for (i, &v) in data.iter().enumerate() {
            raw[info.logical_offset(i)] = v;
        }
        buffer.write(&raw);
        Ok(())
    }

    /// Change cross-plane padding, moving the logical contents into a new buffer
    ///
    /// Emulates an external reallocation: kernels enqueued earlier keep the
    /// old buffer, later launches see the new layout.
    pub fn set_padding(&self, padding: Padding) {
        let mut slot = self.inner.buffer.write();
        let mut info = self.inner.info.write();
        let old = info.clone();
        info.set_padding(padding);

        if let Some(old_buf) = slot.as_ref() {
            let values = old_buf.read_f32(old.dtype());
            let mut moved = vec![0.0f32; info.storage_elements()];
            for i in 0..old.numel() {
                moved[info.logical_offset(i)] = values[old.logical_offset(i)];
            }
            let buffer = DeviceBuffer::new(info.storage_bytes());
            buffer.write_f32(info.dtype(), &moved);
            *slot = Some(Arc::new(buffer));
        }
    }

    /// Signal that the consumer no longer needs this tensor's contents
    pub fn mark_as_unused(&self) {
        self.inner.used.store(false, Ordering::Release);
    }

    /// False once a consumer called [`Tensor::mark_as_unused`]
    pub fn is_used(&self) -> bool {
        self.inner.used.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.inner.info.read();
        f.debug_struct("Tensor")
            .field("id", &self.inner.id)
            .field("shape", info.shape())
            .field("dtype", &info.dtype())
            .field("padding", &info.padding())
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HostAllocator;

    #[test]
    fn test_from_slice_shape_check() {
        let err = Tensor::from_slice(&[1.0f32, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_clones_share_identity() {
        let t = Tensor::zeros(&[2, 2], DType::F32);
        let u = t.clone();
        assert_eq!(t.id(), u.id());
        u.mark_as_unused();
        assert!(!t.is_used());
    }

    #[test]
    fn test_set_padding_preserves_contents() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let t = Tensor::from_slice(&data, &[3, 2, 2]).unwrap();
        t.set_padding(Padding::new(1, 2));
        assert_eq!(t.info().storage_elements(), 3 * 5 * 2);
        assert_eq!(t.to_vec::<f32>().unwrap(), data);
    }

    #[test]
    fn test_allocate_and_free() {
        let alloc = HostAllocator::new();
        let t = Tensor::new(TensorInfo::new([4, 8], DType::F16));
        assert!(!t.is_allocated());
        assert!(matches!(t.bind(), Err(Error::NotAllocated { .. })));

        t.allocate(&alloc).unwrap();
        assert_eq!(alloc.allocated_bytes(), 64);
        t.free();
        assert_eq!(alloc.allocated_bytes(), 0);
    }

    #[test]
    fn test_write_slice_dtype_check() {
        let t = Tensor::zeros(&[2], DType::F16);
        assert!(t.write_slice(&[1.0f32, 2.0]).is_err());
        t.write_slice(&[half::f16::ONE, half::f16::ZERO]).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![1.0, 0.0]);
    }
}
