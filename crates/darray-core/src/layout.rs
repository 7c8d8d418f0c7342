use crate::bail;
use crate::error::{Error, Result};
use crate::shape::{Order, Shape};

// StrideLayout — Coordinate transform from logical index to storage pointer
//
// A layout is (shape, offset, strides). The element at multi-index `idx`
// lives at
//
//     pointer(idx) = offset + Σ idx[i] * strides[i]
//
// Structural transforms (squeeze, transpose, axis moves, narrow, expand)
// only rewrite these three fields, so they are O(rank) and never touch
// element data. Every DArray view is just a different layout over the same
// Storage.
//
// DENSITY:
//
//   A layout is C-dense when every non-unit axis has exactly the row-major
//   stride of its shape, and F-dense for column-major. Unit axes are
//   ignored because their stride is never multiplied by anything but zero.
//   `storage_fast_order` reports which of the two holds, if any.
//
// FORTRAN COMPACTION:
//
//   `compute_fortran_layout(order, compact)` rewrites the layout so that the
//   first axis is the fastest varying one in `order` (C reverses the axes,
//   F keeps them). With `compact`, unit axes are dropped and neighbouring
//   axes that are contiguous with respect to each other are merged:
//
//     dims [3, 2], strides [1, 3]  ->  dims [6], strides [1]
//
//   because stepping 3 times along the first axis lands exactly on the
//   second axis' stride. The result is the minimal-rank description of the
//   same traversal.
//
// RESHAPE LEGALITY:
//
//   A reshape in `order` can be a view exactly when the compacted source
//   equals the compacted dense layout of the target shape (same offset).
//   Then both enumerate the same pointers in the same order, and the view is
//   simply that dense target layout. The test is O(rank).

/// Shape, offset and strides of an array view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StrideLayout {
    shape: Shape,
    offset: usize,
    strides: Vec<usize>,
}

impl StrideLayout {
    /// Create a layout with explicit strides.
    pub fn new(shape: Shape, offset: usize, strides: Vec<usize>) -> Result<Self> {
        if strides.len() != shape.rank() {
            return Err(Error::invalid(format!(
                "layout for shape {} needs {} strides, got {}",
                shape,
                shape.rank(),
                strides.len()
            )));
        }
        Ok(StrideLayout {
            shape,
            offset,
            strides,
        })
    }

    /// Dense layout of `shape` in `order` starting at `offset`.
    /// `Natural` resolves to the default order.
    pub fn dense(shape: Shape, offset: usize, order: Order) -> Self {
        let strides = shape.strides(order.auto_fc()).to_vec();
        StrideLayout {
            shape,
            offset,
            strides,
        }
    }

    fn from_parts(dims: Vec<usize>, offset: usize, strides: Vec<usize>) -> Self {
        StrideLayout {
            shape: Shape::from_positive(dims),
            offset,
            strides,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Size of axis `axis`; negative values count from the end.
    pub fn dim(&self, axis: isize) -> Result<usize> {
        self.shape.dim(axis)
    }

    /// Stride of axis `axis`; negative values count from the end.
    pub fn stride(&self, axis: isize) -> Result<usize> {
        Ok(self.strides[self.shape.axis(axis)?])
    }

    /// Storage pointer of a multi-index. The index is not bounds-checked.
    #[inline]
    pub fn pointer(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.rank());
        self.offset
            + index
                .iter()
                .zip(&self.strides)
                .map(|(&i, &s)| i * s)
                .sum::<usize>()
    }

    /// Storage pointer of a multi-index, validating rank and bounds.
    pub fn checked_pointer(&self, index: &[usize]) -> Result<usize> {
        let in_range = index.len() == self.rank()
            && index.iter().zip(self.dims()).all(|(&i, &d)| i < d);
        if !in_range {
            return Err(Error::IndexOutOfRange {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(self.pointer(index))
    }

    /// Largest pointer reachable through this layout.
    pub fn max_pointer(&self) -> usize {
        self.offset
            + self
                .dims()
                .iter()
                .zip(&self.strides)
                .map(|(&d, &s)| (d - 1) * s)
                .sum::<usize>()
    }

    //  Density

    fn matches_dense(&self, order: Order) -> bool {
        let dense = self.shape.strides(order);
        self.dims()
            .iter()
            .zip(self.strides.iter().zip(dense))
            .all(|(&d, (&s, &ds))| d == 1 || s == ds)
    }

    /// Strides are the row-major strides of the shape (unit axes ignored).
    pub fn is_c_ordered(&self) -> bool {
        self.matches_dense(Order::C)
    }

    /// Strides are the column-major strides of the shape (unit axes ignored).
    pub fn is_f_ordered(&self) -> bool {
        self.matches_dense(Order::F)
    }

    pub fn is_dense(&self) -> bool {
        self.is_c_ordered() || self.is_f_ordered()
    }

    /// The order this layout is dense in, C winning ties; `None` if general
    /// strided.
    pub fn storage_fast_order(&self) -> Option<Order> {
        if self.is_c_ordered() {
            Some(Order::C)
        } else if self.is_f_ordered() {
            Some(Order::F)
        } else {
            None
        }
    }

    /// Resolve `Natural` to the fast order, or C for general strided layouts.
    pub fn resolve_order(&self, order: Order) -> Order {
        match order {
            Order::Natural => self.storage_fast_order().unwrap_or_default(),
            o => o,
        }
    }

    //  Structural transforms

    /// Drop every unit axis.
    pub fn squeeze(&self) -> StrideLayout {
        if self.shape.unit_dim_count() == 0 {
            return self.clone();
        }
        let (dims, strides): (Vec<_>, Vec<_>) = self
            .dims()
            .iter()
            .zip(&self.strides)
            .filter(|&(&d, _)| d != 1)
            .map(|(&d, &s)| (d, s))
            .unzip();
        Self::from_parts(dims, self.offset, strides)
    }

    /// Drop one unit axis.
    pub fn squeeze_axis(&self, axis: isize) -> Result<StrideLayout> {
        let axis = self.shape.axis(axis)?;
        if self.dims()[axis] != 1 {
            bail!("cannot squeeze axis {} of size {}", axis, self.dims()[axis]);
        }
        let mut strides = self.strides.clone();
        strides.remove(axis);
        Ok(Self::from_parts(
            self.shape.narrow_dims(axis),
            self.offset,
            strides,
        ))
    }

    /// Insert a unit axis at `axis`, in `-(rank + 1)..=rank`; negative
    /// positions count from the end of the resulting shape.
    pub fn unsqueeze(&self, axis: isize) -> Result<StrideLayout> {
        let rank = self.rank() as isize;
        let resolved = if axis < 0 { axis + rank + 1 } else { axis };
        if !(0..=rank).contains(&resolved) {
            return Err(Error::AxisOutOfRange {
                axis,
                rank: self.rank() + 1,
            });
        }
        let axis = resolved as usize;
        let stride = if axis < self.rank() {
            self.strides[axis] * self.dims()[axis]
        } else {
            1
        };
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.insert(axis, 1);
        strides.insert(axis, stride);
        Ok(Self::from_parts(dims, self.offset, strides))
    }

    /// Reverse the axis order (full transpose).
    pub fn revert(&self) -> StrideLayout {
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.reverse();
        strides.reverse();
        Self::from_parts(dims, self.offset, strides)
    }

    /// Move axis `src` to position `dst`, shifting the axes in between.
    pub fn move_axis(&self, src: isize, dst: isize) -> Result<StrideLayout> {
        let src = self.shape.axis(src)?;
        let dst = self.shape.axis(dst)?;
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        let d = dims.remove(src);
        let s = strides.remove(src);
        dims.insert(dst, d);
        strides.insert(dst, s);
        Ok(Self::from_parts(dims, self.offset, strides))
    }

    /// Exchange two axes.
    pub fn swap_axis(&self, a: isize, b: isize) -> Result<StrideLayout> {
        let a = self.shape.axis(a)?;
        let b = self.shape.axis(b)?;
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.swap(a, b);
        strides.swap(a, b);
        Ok(Self::from_parts(dims, self.offset, strides))
    }

    /// Reorder axes: new axis `i` is old axis `perm[i]`.
    pub fn permute(&self, perm: &[usize]) -> Result<StrideLayout> {
        let rank = self.rank();
        let mut seen = vec![false; rank];
        for &p in perm {
            if p >= rank || seen[p] {
                return Err(Error::invalid(format!(
                    "{:?} is not a permutation of {} axes",
                    perm, rank
                )));
            }
            seen[p] = true;
        }
        if perm.len() != rank {
            return Err(Error::invalid(format!(
                "{:?} is not a permutation of {} axes",
                perm, rank
            )));
        }
        let dims = perm.iter().map(|&p| self.dims()[p]).collect();
        let strides = perm.iter().map(|&p| self.strides[p]).collect();
        Ok(Self::from_parts(dims, self.offset, strides))
    }

    /// Restrict `axis` to `start..end`. A resulting unit axis is dropped
    /// unless `keep_dim` is set.
    pub fn narrow(&self, axis: isize, keep_dim: bool, start: usize, end: usize) -> Result<StrideLayout> {
        let axis = self.shape.axis(axis)?;
        let size = self.dims()[axis];
        if start >= end || end > size {
            return Err(Error::invalid(format!(
                "cannot narrow axis {} of size {} to {}..{}",
                axis, size, start, end
            )));
        }
        let offset = self.offset + start * self.strides[axis];
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        if !keep_dim && end - start == 1 {
            dims.remove(axis);
            strides.remove(axis);
        } else {
            dims[axis] = end - start;
        }
        Ok(Self::from_parts(dims, offset, strides))
    }

    /// Repeat a unit axis `size` times with stride 0.
    pub fn expand(&self, axis: isize, size: usize) -> Result<StrideLayout> {
        let axis = self.shape.axis(axis)?;
        if self.dims()[axis] != 1 || size == 0 {
            return Err(Error::invalid(format!(
                "cannot expand axis {} of size {} to {}",
                axis,
                self.dims()[axis],
                size
            )));
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims[axis] = size;
        strides[axis] = 0;
        Ok(StrideLayout {
            shape: Shape::new(dims)?,
            offset: self.offset,
            strides,
        })
    }

    //  Compaction and reshape

    /// Rewrite so axis 0 is the fastest in `order`; with `compact`, drop unit
    /// axes and merge axes that are contiguous with respect to each other.
    pub fn compute_fortran_layout(&self, order: Order, compact: bool) -> StrideLayout {
        let order = self.resolve_order(order);
        let base = if order == Order::C {
            self.revert()
        } else {
            self.clone()
        };
        if !compact {
            return base;
        }
        let base = base.squeeze();

        let mut dims: Vec<usize> = Vec::with_capacity(base.rank());
        let mut strides: Vec<usize> = Vec::with_capacity(base.rank());
        for (&d, &s) in base.dims().iter().zip(base.strides()) {
            let n = dims.len();
            if n > 0 && dims[n - 1] * strides[n - 1] == s {
                dims[n - 1] *= d;
            } else {
                dims.push(d);
                strides.push(s);
            }
        }
        Self::from_parts(dims, base.offset, strides)
    }

    /// The view layout of a reshape to `shape` in `order`, if one exists.
    ///
    /// Returns `None` when the elements cannot be reached with a single
    /// dense layout over the same storage, or when the sizes differ.
    pub fn attempt_reshape(&self, shape: &Shape, order: Order) -> Option<StrideLayout> {
        if shape.size() != self.size() {
            return None;
        }
        let order = self.resolve_order(order);
        let target = StrideLayout::dense(shape.clone(), self.offset, order);

        let src = self.compute_fortran_layout(order, true);
        let dst = target.compute_fortran_layout(order, true);
        if src.dims() == dst.dims() && src.strides == dst.strides {
            Some(target)
        } else {
            None
        }
    }
}
