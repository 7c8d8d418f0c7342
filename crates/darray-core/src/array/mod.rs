use std::fmt;

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::iter::{ChunkIterator, PointerIterator};
use crate::layout::StrideLayout;
use crate::shape::{IntoShape, Order, Shape};
use crate::storage::Storage;

mod any;
mod elementwise;
mod linalg;
mod reduce;

pub use any::AnyArray;

// DArray — N-dimensional typed array
//
// A DArray is a (StrideLayout, Storage) pair. The element kind is the type
// parameter, so every kernel below is compiled once per kind and works on
// the raw primitive buffer directly.
//
// VIEWS:
//
//   Structural operations (squeeze, t, move_axis, narrow, chunk, ...) return
//   a new DArray with a rewritten layout and a clone of the same Storage
//   handle. Nothing is copied, and writes through any view are visible
//   through every other view of the buffer.
//
// COPY-OR-VIEW:
//
//   reshape and ravel return a view whenever the layout algebra allows it
//   (see `StrideLayout::attempt_reshape`) and fall back to a dense copy
//   otherwise. flatten and copy always allocate.
//
// MUTATION:
//
//   Methods with a trailing underscore mutate the receiver in place and
//   return it for chaining; their plain counterparts work on a fresh copy.
//   A storage guard is taken once per call, never per element.

/// An N-dimensional array of `T` over shared strided storage.
pub struct DArray<T: Element> {
    layout: StrideLayout,
    storage: Storage<T>,
}

impl<T: Element> Clone for DArray<T> {
    fn clone(&self) -> Self {
        DArray {
            layout: self.layout.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<T: Element> fmt::Debug for DArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DArray(dtype={}, shape={}, offset={}, strides={:?})",
            T::DTYPE,
            self.layout.shape(),
            self.layout.offset(),
            self.layout.strides()
        )?;
        if let Ok(values) = self.to_vec(Order::C) {
            write!(f, " {:?}", values)?;
        }
        Ok(())
    }
}

impl<T: Element> PartialEq for DArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deep_equals(other)
    }
}

impl<T: Element> DArray<T> {
    //  Construction

    /// Wrap `storage` under `layout`. Fails if the layout reaches past the
    /// end of the storage.
    pub fn new(layout: StrideLayout, storage: Storage<T>) -> Result<Self> {
        let max = layout.max_pointer();
        if max >= storage.len() {
            return Err(Error::PointerOutOfRange {
                ptr: max,
                len: storage.len(),
            });
        }
        Ok(DArray { layout, storage })
    }

    /// Trusted constructor for layouts derived from a valid one.
    pub(crate) fn from_parts(layout: StrideLayout, storage: Storage<T>) -> Self {
        DArray { layout, storage }
    }

    /// A view of the same storage under another layout.
    fn view(&self, layout: StrideLayout) -> Self {
        DArray {
            layout,
            storage: self.storage.clone(),
        }
    }

    /// Fresh dense array filled from `values`, given in `order`.
    fn dense_from_vec(&self, shape: Shape, order: Order, values: Vec<T>) -> Self {
        DArray {
            layout: StrideLayout::dense(shape, 0, order),
            storage: Storage::from_vec(values, self.storage.simd()),
        }
    }

    //  Accessors

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn shape(&self) -> &Shape {
        self.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    /// Size of axis `axis`; negative values count from the end.
    pub fn dim(&self, axis: isize) -> Result<usize> {
        self.layout.dim(axis)
    }

    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn layout(&self) -> &StrideLayout {
        &self.layout
    }

    pub fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    /// Whether both arrays are views of the same buffer.
    pub fn shares_storage(&self, other: &DArray<T>) -> bool {
        self.storage.same_buffer(&other.storage)
    }

    pub fn is_scalar(&self) -> bool {
        self.rank() == 0
    }

    /// Walk the storage pointers of this array in `order`.
    pub fn ptr_iter(&self, order: Order) -> PointerIterator {
        PointerIterator::new(&self.layout, order)
    }

    /// Walk this array as contiguous runs in `order`.
    pub fn chunk_iter(&self, order: Order) -> ChunkIterator {
        ChunkIterator::new(&self.layout, order)
    }

    //  Element access

    pub fn get(&self, index: &[usize]) -> Result<T> {
        let ptr = self.layout.checked_pointer(index)?;
        self.storage.get(ptr)
    }

    pub fn set(&self, index: &[usize], value: T) -> Result<()> {
        let ptr = self.layout.checked_pointer(index)?;
        self.storage.set(ptr, value)
    }

    /// Add `value` to the element at `index`.
    pub fn inc(&self, index: &[usize], value: T) -> Result<()> {
        let ptr = self.layout.checked_pointer(index)?;
        self.storage.inc(ptr, value)
    }

    /// Read by raw storage pointer, as produced by `ptr_iter`.
    pub fn ptr_get(&self, ptr: usize) -> Result<T> {
        self.storage.get(ptr)
    }

    /// Write by raw storage pointer, as produced by `ptr_iter`.
    pub fn ptr_set(&self, ptr: usize, value: T) -> Result<()> {
        self.storage.set(ptr, value)
    }

    //  Shape manipulation (views, no data copy)

    /// Drop every unit axis.
    pub fn squeeze(&self) -> DArray<T> {
        self.view(self.layout.squeeze())
    }

    /// Drop one unit axis.
    pub fn squeeze_axis(&self, axis: isize) -> Result<DArray<T>> {
        Ok(self.view(self.layout.squeeze_axis(axis)?))
    }

    /// Insert a unit axis at `axis`; negative positions count from the end.
    pub fn unsqueeze(&self, axis: isize) -> Result<DArray<T>> {
        Ok(self.view(self.layout.unsqueeze(axis)?))
    }

    /// Transpose: reverse the axis order.
    pub fn t(&self) -> DArray<T> {
        self.view(self.layout.revert())
    }

    pub fn move_axis(&self, src: isize, dst: isize) -> Result<DArray<T>> {
        Ok(self.view(self.layout.move_axis(src, dst)?))
    }

    pub fn swap_axis(&self, a: isize, b: isize) -> Result<DArray<T>> {
        Ok(self.view(self.layout.swap_axis(a, b)?))
    }

    /// New axis `i` is old axis `perm[i]`.
    pub fn permute(&self, perm: &[usize]) -> Result<DArray<T>> {
        Ok(self.view(self.layout.permute(perm)?))
    }

    /// Restrict `axis` to `start..end`; a unit result axis is dropped unless
    /// `keep_dim` is set.
    pub fn narrow(&self, axis: isize, keep_dim: bool, start: usize, end: usize) -> Result<DArray<T>> {
        Ok(self.view(self.layout.narrow(axis, keep_dim, start, end)?))
    }

    /// Split `axis` into consecutive views of `size` elements; the last one
    /// is shorter when `size` does not divide the axis.
    pub fn chunk(&self, axis: isize, keep_dim: bool, size: usize) -> Result<Vec<DArray<T>>> {
        let dim = self.layout.dim(axis)?;
        if size == 0 {
            return Err(Error::invalid("chunk size must be positive"));
        }
        (0..dim)
            .step_by(size)
            .map(|start| self.narrow(axis, keep_dim, start, (start + size).min(dim)))
            .collect()
    }

    /// Split `axis` at the given start indices, each view running to the
    /// next index or the end of the axis.
    pub fn split(&self, axis: isize, keep_dim: bool, indices: &[usize]) -> Result<Vec<DArray<T>>> {
        let dim = self.layout.dim(axis)?;
        if indices.windows(2).any(|w| w[0] >= w[1]) || indices.last().is_some_and(|&i| i >= dim) {
            return Err(Error::invalid(format!(
                "split indices {:?} must be increasing and below {}",
                indices, dim
            )));
        }
        indices
            .iter()
            .enumerate()
            .map(|(k, &start)| {
                let end = indices.get(k + 1).copied().unwrap_or(dim);
                self.narrow(axis, keep_dim, start, end)
            })
            .collect()
    }

    /// Repeat a unit axis `size` times without copying.
    pub fn expand(&self, axis: isize, size: usize) -> Result<DArray<T>> {
        Ok(self.view(self.layout.expand(axis, size)?))
    }

    //  Copy-or-view

    /// Reshape, as a view when the layouts allow it and a copy otherwise.
    pub fn reshape(&self, shape: impl IntoShape, order: Order) -> Result<DArray<T>> {
        let shape = shape.into_shape()?;
        if shape.size() != self.size() {
            return Err(Error::ReshapeSizeMismatch {
                src: self.size(),
                dst: shape.size(),
                dst_shape: shape,
            });
        }
        if let Some(layout) = self.layout.attempt_reshape(&shape, order) {
            log::debug!("reshape {} -> {} as view", self.shape(), shape);
            return Ok(self.view(layout));
        }
        log::debug!("reshape {} -> {} as copy", self.shape(), shape);
        let order = self.layout.resolve_order(order);
        let values = self.to_vec(order)?;
        Ok(self.dense_from_vec(shape, order, values))
    }

    /// Rank-1 view when the elements form one run in `order`, else a
    /// flattened copy.
    pub fn ravel(&self, order: Order) -> Result<DArray<T>> {
        let compact = self.layout.compute_fortran_layout(order, true);
        if compact.rank() <= 1 {
            let stride = compact.strides().first().copied().unwrap_or(1);
            let shape = Shape::new(vec![self.size()])?;
            let layout = StrideLayout::new(shape, compact.offset(), vec![stride])?;
            return Ok(self.view(layout));
        }
        self.flatten(order)
    }

    /// Rank-1 copy of the elements read in `order`.
    pub fn flatten(&self, order: Order) -> Result<DArray<T>> {
        let order = self.layout.resolve_order(order);
        let values = self.to_vec(order)?;
        Ok(self.dense_from_vec(Shape::new(vec![self.size()])?, order, values))
    }

    /// Dense copy in `order` over fresh storage.
    pub fn copy(&self, order: Order) -> Result<DArray<T>> {
        let order = self.layout.resolve_order(order);
        let values = self.to_vec(order)?;
        log::trace!("copy {} into fresh {:?} storage", self.shape(), order);
        Ok(self.dense_from_vec(self.shape().clone(), order, values))
    }

    /// Copy every element into `dst`, which must have the same shape.
    pub fn copy_to(&self, dst: &DArray<T>) -> Result<()> {
        self.check_same_shape(dst)?;
        let order = dst.layout.storage_fast_order().unwrap_or_default();
        if self.shares_storage(dst) {
            // the source may overlap the destination: read it out first
            let values = self.to_vec(order)?;
            let mut buf = dst.storage.write()?;
            for (p, v) in dst.ptr_iter(order).zip(values) {
                buf[p] = v;
            }
            return Ok(());
        }
        let src = self.storage.read()?;
        let mut buf = dst.storage.write()?;
        for (p, q) in dst.ptr_iter(order).zip(self.ptr_iter(order)) {
            buf[p] = src[q];
        }
        Ok(())
    }

    /// Dense copy converted to another element kind.
    pub fn cast<U: Element>(&self, order: Order) -> Result<DArray<U>> {
        let order = self.layout.resolve_order(order);
        let values: Vec<U> = {
            let buf = self.storage.read()?;
            self.ptr_iter(order).map(|p| U::cast(buf[p])).collect()
        };
        Ok(DArray {
            layout: StrideLayout::dense(self.shape().clone(), 0, order),
            storage: Storage::from_vec(values, self.storage.simd()),
        })
    }

    //  Data extraction

    /// All elements read in `order`.
    pub fn to_vec(&self, order: Order) -> Result<Vec<T>> {
        let buf = self.storage.read()?;
        let mut out = Vec::with_capacity(self.size());
        for chunk in self.chunk_iter(order) {
            if chunk.step == 1 {
                out.extend_from_slice(&buf[chunk.start..chunk.start + chunk.len]);
            } else {
                out.extend(chunk.pointers().map(|p| buf[p]));
            }
        }
        Ok(out)
    }

    /// Same shape and equal values in C order; NaN equals NaN.
    pub fn deep_equals(&self, other: &DArray<T>) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        match (self.to_vec(Order::C), other.to_vec(Order::C)) {
            (Ok(a), Ok(b)) => a
                .iter()
                .zip(&b)
                .all(|(x, y)| x == y || (x.is_nan() && y.is_nan())),
            _ => false,
        }
    }

    pub(crate) fn check_same_shape(&self, other: &DArray<T>) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: other.shape().clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::SimdConfig;

    fn arr(values: Vec<f64>, dims: &[usize]) -> DArray<f64> {
        let shape = Shape::new(dims.to_vec()).unwrap();
        let layout = StrideLayout::dense(shape, 0, Order::C);
        DArray::new(layout, Storage::from_vec(values, SimdConfig::with_vector_bytes(32))).unwrap()
    }

    fn seq(dims: &[usize]) -> DArray<f64> {
        let n = dims.iter().product::<usize>();
        arr((0..n).map(|i| i as f64).collect(), dims)
    }

    #[test]
    fn test_new_rejects_short_storage() {
        let shape = Shape::new(vec![2, 3]).unwrap();
        let layout = StrideLayout::dense(shape, 1, Order::C);
        let storage = Storage::<f32>::zeros(6, SimdConfig::scalar());
        assert!(matches!(
            DArray::new(layout, storage),
            Err(Error::PointerOutOfRange { ptr: 6, len: 6 })
        ));
    }

    #[test]
    fn test_get_set_inc() {
        let a = seq(&[2, 3]);
        assert_eq!(a.get(&[1, 2]).unwrap(), 5.0);
        a.set(&[0, 1], 10.0).unwrap();
        a.inc(&[0, 1], 0.5).unwrap();
        assert_eq!(a.get(&[0, 1]).unwrap(), 10.5);
        assert!(matches!(a.get(&[2, 0]), Err(Error::IndexOutOfRange { .. })));

        let p = a.layout().pointer(&[1, 0]);
        a.ptr_set(p, -1.0).unwrap();
        assert_eq!(a.ptr_get(p).unwrap(), -1.0);
    }

    #[test]
    fn test_transpose_scenario() {
        let a = arr(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let t = a.t();
        assert_eq!(t, arr(vec![1.0, 3.0, 2.0, 4.0], &[2, 2]));
        assert!(t.shares_storage(&a));
        assert_eq!(t.t(), a);
    }

    #[test]
    fn test_views_alias() {
        let a = seq(&[3, 4]);
        let row = a.narrow(0, false, 1, 2).unwrap();
        assert_eq!(row.dims(), &[4]);
        row.set(&[0], 100.0).unwrap();
        assert_eq!(a.get(&[1, 0]).unwrap(), 100.0);
    }

    #[test]
    fn test_chunk_and_split() {
        let a = seq(&[5, 2]);
        let chunks = a.chunk(0, true, 2).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].dims(), &[2, 2]);
        assert_eq!(chunks[2].dims(), &[1, 2]);
        assert_eq!(chunks[2].to_vec(Order::C).unwrap(), vec![8.0, 9.0]);

        let parts = a.split(0, false, &[0, 1, 3]).unwrap();
        assert_eq!(parts[0].dims(), &[2]);
        assert_eq!(parts[1].dims(), &[2, 2]);
        assert_eq!(parts[2].dims(), &[2, 2]);
        assert!(a.split(0, true, &[2, 1]).is_err());
        assert!(a.split(0, true, &[5]).is_err());
    }

    #[test]
    fn test_reshape_view_and_copy() {
        let a = seq(&[2, 3]);
        let v = a.reshape((3, 2), Order::C).unwrap();
        assert!(v.shares_storage(&a));
        assert_eq!(v.to_vec(Order::C).unwrap(), a.to_vec(Order::C).unwrap());

        let c = a.t().reshape(6, Order::C).unwrap();
        assert!(!c.shares_storage(&a));
        assert_eq!(c.to_vec(Order::C).unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

        assert!(matches!(
            a.reshape(5, Order::C),
            Err(Error::ReshapeSizeMismatch { src: 6, dst: 5, .. })
        ));
    }

    #[test]
    fn test_ravel_and_flatten() {
        let a = seq(&[2, 3]);
        assert!(a.ravel(Order::C).unwrap().shares_storage(&a));
        let f = a.ravel(Order::F).unwrap();
        assert!(!f.shares_storage(&a));
        assert_eq!(f.to_vec(Order::C).unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert!(!a.flatten(Order::C).unwrap().shares_storage(&a));
    }

    #[test]
    fn test_copy_is_independent() {
        let a = seq(&[2, 3]);
        let c = a.copy(Order::F).unwrap();
        assert!(c.layout().is_f_ordered());
        assert_eq!(c, a);
        c.set(&[0, 0], 42.0).unwrap();
        assert_eq!(a.get(&[0, 0]).unwrap(), 0.0);
    }

    #[test]
    fn test_copy_to_overlapping() {
        let a = arr(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        a.t().copy_to(&a).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![1.0, 3.0, 2.0, 4.0]);
        assert!(a.copy_to(&seq(&[4])).is_err());
    }

    #[test]
    fn test_cast() {
        let a = arr(vec![1.7, -2.5, 300.0], &[3]);
        let b = a.cast::<i8>(Order::C).unwrap();
        assert_eq!(b.to_vec(Order::C).unwrap(), vec![1, -2, 44]);
        assert_eq!(b.dtype(), DType::Byte);
    }

    #[test]
    fn test_deep_equals_nan() {
        let a = arr(vec![f64::NAN, 1.0], &[2]);
        let b = arr(vec![f64::NAN, 1.0], &[2]);
        assert!(a.deep_equals(&b));
        assert!(!a.deep_equals(&arr(vec![f64::NAN, 1.0], &[2, 1])));
    }
}
