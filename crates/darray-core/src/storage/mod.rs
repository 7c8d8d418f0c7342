use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::simd::SimdConfig;

pub mod persist;

// Storage — A flat, dtype-homogeneous primitive buffer
//
// Storage knows nothing about shapes: it is addressed by a single integer
// pointer. Views (reshape, transpose, narrow, ...) differ only in the
// StrideLayout they use to compute pointers, so they all hold a clone of
// the same Storage.
//
// MEMORY MODEL:
//
//   The buffer lives behind Arc<RwLock<Vec<T>>>. Cloning a Storage is O(1)
//   and yields another handle to the same elements; the buffer is freed
//   when the last handle (the longest-lived view) drops.
//
//   Aliasing across views is part of the contract: writing through one
//   view is immediately visible through every other view.
//
//   The lock is taken once per operation. Bulk loops receive the guarded
//   slice and run without further synchronization.
//
// LANES:
//
//   `get_vector`/`set_vector` move one hardware vector worth of contiguous
//   elements; the indexed variants gather/scatter through an index table
//   for axes that are not unit-stride. Lane width comes from the SimdConfig
//   injected at construction.

/// Shared, reference-counted primitive buffer.
pub struct Storage<T: Element> {
    buf: Arc<RwLock<Vec<T>>>,
    simd: SimdConfig,
}

impl<T: Element> Clone for Storage<T> {
    fn clone(&self) -> Self {
        Storage {
            buf: Arc::clone(&self.buf),
            simd: self.simd,
        }
    }
}

impl<T: Element> std::fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Storage(dtype={}, len={})", T::DTYPE, self.len())
    }
}

impl<T: Element> Storage<T> {
    /// Allocate `len` zeroed elements.
    pub fn zeros(len: usize, simd: SimdConfig) -> Self {
        Self::from_vec(vec![T::zero(); len], simd)
    }

    /// Wrap an existing vector without copying.
    pub fn from_vec(data: Vec<T>, simd: SimdConfig) -> Self {
        Storage {
            buf: Arc::new(RwLock::new(data)),
            simd,
        }
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn simd(&self) -> SimdConfig {
        self.simd
    }

    /// Number of elements in the buffer. The length never changes after
    /// allocation, so it is still reported for a poisoned lock.
    pub fn len(&self) -> usize {
        self.buf.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lanes per hardware vector for this element kind.
    pub fn vector_lanes(&self) -> usize {
        T::DTYPE.lanes(&self.simd)
    }

    /// Whether lane operations map onto real vector registers.
    pub fn supports_vectorization(&self) -> bool {
        self.vector_lanes() > 1
    }

    /// Whether two handles refer to the same buffer.
    pub fn same_buffer(&self, other: &Storage<T>) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf)
    }

    /// Acquire the buffer for reading, once per bulk operation.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Vec<T>>> {
        self.buf.read().map_err(|_| Error::LockPoisoned)
    }

    /// Acquire the buffer for writing, once per bulk operation.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<T>>> {
        self.buf.write().map_err(|_| Error::LockPoisoned)
    }

    /// Copy the whole buffer out.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.read()?.clone())
    }

    //  Scalar access

    pub fn get(&self, ptr: usize) -> Result<T> {
        let buf = self.read()?;
        buf.get(ptr).copied().ok_or(Error::PointerOutOfRange {
            ptr,
            len: buf.len(),
        })
    }

    pub fn set(&self, ptr: usize, value: T) -> Result<()> {
        let mut buf = self.write()?;
        let len = buf.len();
        let slot = buf
            .get_mut(ptr)
            .ok_or(Error::PointerOutOfRange { ptr, len })?;
        *slot = value;
        Ok(())
    }

    /// Add `value` to the element at `ptr`.
    pub fn inc(&self, ptr: usize, value: T) -> Result<()> {
        let mut buf = self.write()?;
        let len = buf.len();
        let slot = buf
            .get_mut(ptr)
            .ok_or(Error::PointerOutOfRange { ptr, len })?;
        *slot = slot.binary(crate::ops::BinaryOp::Add, value);
        Ok(())
    }

    /// Set `len` elements starting at `start` to `value`.
    pub fn fill(&self, value: T, start: usize, len: usize) -> Result<()> {
        let mut buf = self.write()?;
        let end = checked_end(start, len, buf.len())?;
        buf[start..end].fill(value);
        Ok(())
    }

    //  Lane access

    /// Load `lanes.len()` contiguous elements starting at `offset`.
    pub fn get_vector(&self, offset: usize, lanes: &mut [T]) -> Result<()> {
        let buf = self.read()?;
        let end = checked_end(offset, lanes.len(), buf.len())?;
        lanes.copy_from_slice(&buf[offset..end]);
        Ok(())
    }

    /// Store `lanes` contiguously starting at `offset`.
    pub fn set_vector(&self, offset: usize, lanes: &[T]) -> Result<()> {
        let mut buf = self.write()?;
        let end = checked_end(offset, lanes.len(), buf.len())?;
        buf[offset..end].copy_from_slice(lanes);
        Ok(())
    }

    /// Gather: `lanes[i] = buf[offset + index[index_offset + i]]`.
    pub fn get_vector_indexed(
        &self,
        offset: usize,
        index: &[usize],
        index_offset: usize,
        lanes: &mut [T],
    ) -> Result<()> {
        let buf = self.read()?;
        let table = index_table(index, index_offset, lanes.len())?;
        for (lane, &i) in lanes.iter_mut().zip(table) {
            let ptr = offset + i;
            *lane = *buf.get(ptr).ok_or(Error::PointerOutOfRange {
                ptr,
                len: buf.len(),
            })?;
        }
        Ok(())
    }

    /// Scatter: `buf[offset + index[index_offset + i]] = lanes[i]`.
    pub fn set_vector_indexed(
        &self,
        offset: usize,
        index: &[usize],
        index_offset: usize,
        lanes: &[T],
    ) -> Result<()> {
        let mut buf = self.write()?;
        let len = buf.len();
        let table = index_table(index, index_offset, lanes.len())?;
        for (&lane, &i) in lanes.iter().zip(table) {
            let ptr = offset + i;
            *buf.get_mut(ptr)
                .ok_or(Error::PointerOutOfRange { ptr, len })? = lane;
        }
        Ok(())
    }
}

fn checked_end(start: usize, len: usize, buf_len: usize) -> Result<usize> {
    let end = start + len;
    if end > buf_len {
        return Err(Error::PointerOutOfRange {
            ptr: end.saturating_sub(1),
            len: buf_len,
        });
    }
    Ok(end)
}

fn index_table(index: &[usize], index_offset: usize, lanes: usize) -> Result<&[usize]> {
    index
        .get(index_offset..index_offset + lanes)
        .ok_or_else(|| {
            Error::invalid(format!(
                "index table of length {} too short for {} lanes at offset {}",
                index.len(),
                lanes,
                index_offset
            ))
        })
}

// Lane kernels on already-guarded slices
//
// Bulk array operations acquire the guard once and then walk chunks with
// these helpers, one hardware vector at a time.

/// Load lanes from `buf` starting at `start` with stride `step`.
#[inline]
pub(crate) fn load_lanes<T: Copy>(buf: &[T], start: usize, step: usize, lanes: &mut [T]) {
    if step == 1 {
        lanes.copy_from_slice(&buf[start..start + lanes.len()]);
    } else {
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = buf[start + i * step];
        }
    }
}

/// Store lanes into `buf` starting at `start` with stride `step`.
#[inline]
pub(crate) fn store_lanes<T: Copy>(buf: &mut [T], start: usize, step: usize, lanes: &[T]) {
    if step == 1 {
        buf[start..start + lanes.len()].copy_from_slice(lanes);
    } else {
        for (i, &lane) in lanes.iter().enumerate() {
            buf[start + i * step] = lane;
        }
    }
}

// AnyStorage — Storage with its element kind resolved at runtime

/// A storage of any element kind.
#[derive(Debug, Clone)]
pub enum AnyStorage {
    Byte(Storage<i8>),
    Int(Storage<i32>),
    Float(Storage<f32>),
    Double(Storage<f64>),
}

impl AnyStorage {
    pub fn dtype(&self) -> DType {
        match self {
            AnyStorage::Byte(_) => DType::Byte,
            AnyStorage::Int(_) => DType::Int,
            AnyStorage::Float(_) => DType::Float,
            AnyStorage::Double(_) => DType::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnyStorage::Byte(s) => s.len(),
            AnyStorage::Int(s) => s.len(),
            AnyStorage::Float(s) => s.len(),
            AnyStorage::Double(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recover the typed storage; fails if the kinds differ.
    pub fn typed<T: Element>(self) -> Result<Storage<T>> {
        let got = self.dtype();
        T::from_any_storage(self).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }
}

impl<T: Element> From<Storage<T>> for AnyStorage {
    fn from(storage: Storage<T>) -> Self {
        T::into_any_storage(storage)
    }
}
