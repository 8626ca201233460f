//! Device buffers: reference-counted byte storage

use crate::dtype::{DType, Element, dispatch_dtype};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A block of device memory
///
/// Backed by 8-byte words so it can be viewed as any [`Element`] slice
/// through bytemuck. Kernels hold an `Arc<DeviceBuffer>` for the duration of
/// a launch; the memory is returned to its allocator when the last reference
/// is dropped.
pub struct DeviceBuffer {
    words: RwLock<Vec<u64>>,
    size_bytes: usize,
    /// Allocator usage counter to decrement on drop
    tracker: Option<Arc<AtomicUsize>>,
}

impl DeviceBuffer {
    /// Zero-initialized buffer not accounted to any allocator
    pub fn new(size_bytes: usize) -> Self {
        Self {
            words: RwLock::new(vec![0u64; size_bytes.div_ceil(8)]),
            size_bytes,
            tracker: None,
        }
    }

    pub(crate) fn tracked(size_bytes: usize, tracker: Arc<AtomicUsize>) -> Self {
        Self {
            words: RwLock::new(vec![0u64; size_bytes.div_ceil(8)]),
            size_bytes,
            tracker: Some(tracker),
        }
    }

    /// Size in bytes
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Copy the whole buffer out as elements of type `T`
    pub fn read<T: Element>(&self) -> Vec<T> {
        let words = self.words.read();
        let elems: &[T] = bytemuck::cast_slice(words.as_slice());
        elems[..self.size_bytes / std::mem::size_of::<T>()].to_vec()
    }

    /// Overwrite the buffer prefix with `data`
    pub fn write<T: Element>(&self, data: &[T]) {
        let mut words = self.words.write();
        let elems: &mut [T] = bytemuck::cast_slice_mut(words.as_mut_slice());
        let len = data.len().min(self.size_bytes / std::mem::size_of::<T>());
        elems[..len].copy_from_slice(&data[..len]);
    }

    /// Read the buffer as `dtype` elements widened to f32
    pub fn read_f32(&self, dtype: DType) -> Vec<f32> {
        dispatch_dtype!(dtype, T => {
            self.read::<T>().into_iter().map(Element::to_f32).collect()
        })
    }

    /// Write f32 values narrowed to `dtype`
    pub fn write_f32(&self, dtype: DType, data: &[f32]) {
        dispatch_dtype!(dtype, T => {
            let narrowed: Vec<T> = data.iter().map(|&v| T::from_f32(v)).collect();
            self.write(&narrowed);
        })
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Some(tracker) = &self.tracker {
            tracker.fetch_sub(self.size_bytes, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_sizes_round_trip() {
        let buf = DeviceBuffer::new(6);
        buf.write::<u8>(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.read::<u8>(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_f16_widening() {
        let buf = DeviceBuffer::new(3 * 2);
        buf.write_f32(DType::F16, &[0.5, -1.0, 2.0]);
        assert_eq!(buf.read_f32(DType::F16), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_tracker_released_on_drop() {
        let tracker = Arc::new(AtomicUsize::new(64));
        let buf = DeviceBuffer::tracked(64, tracker.clone());
        drop(buf);
        assert_eq!(tracker.load(Ordering::Relaxed), 0);
    }
}
