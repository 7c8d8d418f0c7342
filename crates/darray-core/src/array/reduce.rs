use std::cmp::Ordering;

use crate::bail;
use crate::dtype::Element;
use crate::error::Result;
use crate::iter::PointerIterator;
use crate::layout::StrideLayout;
use crate::ops::{BinaryOp, UnaryOp};
use crate::shape::{IntoShape, Order, Shape};

use super::DArray;

// Reductions
//
// Order-insensitive reductions walk the storage in natural order, run by
// run. Arg-reductions walk in C order so the returned position is the
// element's C-order position.
//
// Variance and norms accumulate in f64 whatever the element kind.
//
// Partial reductions split the axes into an inner block, reduced to one
// value, and the outer axes that remain. Blocks are views of the receiver;
// results are written in C order of the outer axes:
//
//   *_axis(axis)               inner = [axis]
//   *_on(shape, keep_dim, ..)  inner = trailing axes matching `shape`

impl<T: Element> DArray<T> {
    /// Fold every element with `op`, starting from `init`.
    fn fold(&self, init: T, op: BinaryOp) -> Result<T> {
        let buf = self.storage.read()?;
        let mut acc = init;
        for chunk in self.chunk_iter(Order::Natural) {
            if chunk.step == 1 {
                for &v in &buf[chunk.start..chunk.start + chunk.len] {
                    acc = acc.binary(op, v);
                }
            } else {
                for p in chunk.pointers() {
                    acc = acc.binary(op, buf[p]);
                }
            }
        }
        Ok(acc)
    }

    /// Sum of all elements; integer kinds wrap.
    pub fn sum(&self) -> Result<T> {
        self.fold(T::zero(), BinaryOp::Add)
    }

    /// Product of all elements; integer kinds wrap.
    pub fn prod(&self) -> Result<T> {
        self.fold(T::one(), BinaryOp::Mul)
    }

    /// Smallest element; NaN if any element is NaN.
    pub fn min(&self) -> Result<T> {
        let first = self.first()?;
        self.fold(first, BinaryOp::Min)
    }

    /// Largest element; NaN if any element is NaN.
    pub fn max(&self) -> Result<T> {
        let first = self.first()?;
        self.fold(first, BinaryOp::Max)
    }

    /// Arithmetic mean; floating kinds only.
    pub fn mean(&self) -> Result<T> {
        if T::DTYPE.is_integer() {
            bail!("mean is only defined for floating kinds, not {}", T::DTYPE);
        }
        Ok(self.sum()?.binary(BinaryOp::Div, T::from_index(self.size())))
    }

    //  NaN-skipping

    /// Sum of the non-NaN elements.
    pub fn nan_sum(&self) -> Result<T> {
        self.fold_present(T::zero(), BinaryOp::Add)
    }

    /// Product of the non-NaN elements.
    pub fn nan_prod(&self) -> Result<T> {
        self.fold_present(T::one(), BinaryOp::Mul)
    }

    /// Smallest non-NaN element; NaN when every element is NaN.
    pub fn nan_min(&self) -> Result<T> {
        match self.first_present()? {
            Some(first) => self.fold_present(first, BinaryOp::Min),
            None => self.first(),
        }
    }

    /// Largest non-NaN element; NaN when every element is NaN.
    pub fn nan_max(&self) -> Result<T> {
        match self.first_present()? {
            Some(first) => self.fold_present(first, BinaryOp::Max),
            None => self.first(),
        }
    }

    /// Mean of the non-NaN elements; floating kinds only.
    pub fn nan_mean(&self) -> Result<T> {
        self.check_floating("nan_mean")?;
        let present = self.size() - self.nan_count()?;
        Ok(self.nan_sum()?.binary(BinaryOp::Div, T::from_index(present)))
    }

    //  Dispersion and norms

    /// Variance with `ddof` delta degrees of freedom, computed around the
    /// mean with a compensating term for its rounding error.
    pub fn var(&self, ddof: usize) -> Result<T> {
        self.check_floating("var")?;
        let n = self.size();
        if ddof >= n {
            bail!("ddof {} leaves no degrees of freedom over {} elements", ddof, n);
        }
        let buf = self.storage.read()?;
        let mean = self.ptr_iter(Order::Natural).map(|p| buf[p].to_f64()).sum::<f64>() / n as f64;
        let (mut sum2, mut sum3) = (0.0, 0.0);
        for p in self.ptr_iter(Order::Natural) {
            let centered = buf[p].to_f64() - mean;
            sum2 += centered * centered;
            sum3 += centered;
        }
        let dof = (n - ddof) as f64;
        Ok(T::from_f64((sum2 - sum3 * sum3 / dof) / dof))
    }

    /// Standard deviation, the square root of [`var`](Self::var).
    pub fn std(&self, ddof: usize) -> Result<T> {
        Ok(self.var(ddof)?.unary(UnaryOp::Sqrt))
    }

    /// The p-norm `(sum |x|^p)^(1/p)`. `p = 0` counts the elements.
    pub fn norm(&self, p: f64) -> Result<T> {
        self.check_floating("norm")?;
        if p.is_nan() || p < 0.0 {
            bail!("norm power must be non-negative, got {}", p);
        }
        if p == 0.0 {
            return Ok(T::from_index(self.size()));
        }
        let buf = self.storage.read()?;
        let abs = self.ptr_iter(Order::Natural).map(|q| buf[q].to_f64().abs());
        let norm = if p == 1.0 {
            abs.sum::<f64>()
        } else if p == 2.0 {
            abs.map(|v| v * v).sum::<f64>().sqrt()
        } else {
            abs.map(|v| v.powf(p)).sum::<f64>().powf(1.0 / p)
        };
        Ok(T::from_f64(norm))
    }

    /// Divide every element by the p-norm.
    pub fn normalize_(&self, p: f64) -> Result<&Self> {
        let norm = self.norm(p)?;
        self.div_scalar_(norm)
    }

    pub fn nan_count(&self) -> Result<usize> {
        self.count_where(|v| v.is_nan())
    }

    pub fn zero_count(&self) -> Result<usize> {
        self.count_where(|v| v == T::zero())
    }

    /// Sum of the main diagonal of a square matrix.
    pub fn trace(&self) -> Result<T> {
        if self.rank() != 2 || self.dims()[0] != self.dims()[1] {
            bail!("trace requires a square matrix, got shape {}", self.shape());
        }
        let buf = self.storage.read()?;
        let mut acc = T::zero();
        for i in 0..self.dims()[0] {
            acc = acc.binary(BinaryOp::Add, buf[self.layout.pointer(&[i, i])]);
        }
        Ok(acc)
    }

    /// C-order position of the first largest element.
    pub fn argmax(&self) -> Result<usize> {
        self.arg_best(Ordering::Greater)
    }

    /// C-order position of the first smallest element.
    pub fn argmin(&self) -> Result<usize> {
        self.arg_best(Ordering::Less)
    }

    fn arg_best(&self, wins: Ordering) -> Result<usize> {
        let buf = self.storage.read()?;
        let mut it = self.ptr_iter(Order::C);
        let mut best = buf[it.next_ptr()];
        let mut best_pos = 0;
        for (i, p) in it.enumerate() {
            if buf[p].natural_cmp(&best) == wins {
                best = buf[p];
                best_pos = i + 1;
            }
        }
        Ok(best_pos)
    }

    //  Reductions along one axis

    pub fn sum_axis(&self, axis: isize) -> Result<DArray<T>> {
        self.reduce_axis(axis, |b| b.sum())
    }

    pub fn mean_axis(&self, axis: isize) -> Result<DArray<T>> {
        self.check_floating("mean_axis")?;
        self.reduce_axis(axis, |b| b.mean())
    }

    pub fn var_axis(&self, axis: isize, ddof: usize) -> Result<DArray<T>> {
        self.check_floating("var_axis")?;
        self.reduce_axis(axis, |b| b.var(ddof))
    }

    pub fn min_axis(&self, axis: isize) -> Result<DArray<T>> {
        self.reduce_axis(axis, |b| b.min())
    }

    pub fn max_axis(&self, axis: isize) -> Result<DArray<T>> {
        self.reduce_axis(axis, |b| b.max())
    }

    //  Reductions over trailing axes

    /// Sum over the trailing axes, which must equal `shape`. With
    /// `keep_dim` the reduced axes stay as unit axes.
    pub fn sum_on(&self, shape: impl IntoShape, keep_dim: bool, order: Order) -> Result<DArray<T>> {
        self.reduce_on(shape, keep_dim, order, |b| b.sum())
    }

    pub fn mean_on(&self, shape: impl IntoShape, keep_dim: bool, order: Order) -> Result<DArray<T>> {
        self.check_floating("mean_on")?;
        self.reduce_on(shape, keep_dim, order, |b| b.mean())
    }

    pub fn var_on(
        &self,
        shape: impl IntoShape,
        ddof: usize,
        keep_dim: bool,
        order: Order,
    ) -> Result<DArray<T>> {
        self.check_floating("var_on")?;
        self.reduce_on(shape, keep_dim, order, |b| b.var(ddof))
    }

    fn reduce_axis(&self, axis: isize, f: impl Fn(&DArray<T>) -> Result<T>) -> Result<DArray<T>> {
        let axis = self.shape().axis(axis)?;
        let (outer, values) = self.reduce_blocks(&[axis], f)?;
        Ok(self.dense_from_vec(outer, Order::C, values))
    }

    fn reduce_on(
        &self,
        shape: impl IntoShape,
        keep_dim: bool,
        order: Order,
        f: impl Fn(&DArray<T>) -> Result<T>,
    ) -> Result<DArray<T>> {
        let shape = shape.into_shape()?;
        let (rank, k) = (self.rank(), shape.rank());
        if k > rank || self.dims()[rank - k..] != *shape.dims() {
            bail!("cannot reduce {} over trailing shape {}", self.shape(), shape);
        }
        let inner: Vec<usize> = (rank - k..rank).collect();
        let (outer, values) = self.reduce_blocks(&inner, f)?;
        let mut dims = outer.dims().to_vec();
        if keep_dim {
            dims.resize(rank, 1);
        }
        let out = self.dense_from_vec(Shape::new(dims)?, Order::C, values);
        if order == Order::F {
            return out.copy(Order::F);
        }
        Ok(out)
    }

    /// Apply `f` to the block spanned by the `inner` axes at every position
    /// of the other axes, walked in C order.
    fn reduce_blocks(
        &self,
        inner: &[usize],
        f: impl Fn(&DArray<T>) -> Result<T>,
    ) -> Result<(Shape, Vec<T>)> {
        let (mut outer_dims, mut outer_strides) = (Vec::new(), Vec::new());
        let (mut inner_dims, mut inner_strides) = (Vec::new(), Vec::new());
        for (axis, (&d, &s)) in self.dims().iter().zip(self.layout.strides()).enumerate() {
            if inner.contains(&axis) {
                inner_dims.push(d);
                inner_strides.push(s);
            } else {
                outer_dims.push(d);
                outer_strides.push(s);
            }
        }
        let outer = StrideLayout::new(Shape::new(outer_dims)?, self.layout.offset(), outer_strides)?;
        let inner_shape = Shape::new(inner_dims)?;

        let mut values = Vec::with_capacity(outer.size());
        for p in PointerIterator::new(&outer, Order::C) {
            let block = StrideLayout::new(inner_shape.clone(), p, inner_strides.clone())?;
            values.push(f(&self.view(block))?);
        }
        log::trace!(
            "reduced {} blocks of {} over {}",
            values.len(),
            inner_shape,
            self.shape()
        );
        Ok((outer.shape().clone(), values))
    }

    fn first(&self) -> Result<T> {
        let p = self.ptr_iter(Order::Natural).next_ptr();
        self.storage.get(p)
    }

    /// Fold the non-NaN elements with `op`, starting from `init`.
    fn fold_present(&self, init: T, op: BinaryOp) -> Result<T> {
        let buf = self.storage.read()?;
        Ok(self
            .ptr_iter(Order::Natural)
            .map(|p| buf[p])
            .filter(|v| !v.is_nan())
            .fold(init, |acc, v| acc.binary(op, v)))
    }

    fn first_present(&self) -> Result<Option<T>> {
        let buf = self.storage.read()?;
        Ok(self.ptr_iter(Order::Natural).map(|p| buf[p]).find(|v| !v.is_nan()))
    }

    fn count_where(&self, pred: impl Fn(T) -> bool) -> Result<usize> {
        let buf = self.storage.read()?;
        Ok(self
            .ptr_iter(Order::Natural)
            .filter(|&p| pred(buf[p]))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StrideLayout;
    use crate::shape::Shape;
    use crate::simd::SimdConfig;
    use crate::storage::Storage;

    fn arr<T: Element>(values: Vec<T>, dims: &[usize]) -> DArray<T> {
        let shape = Shape::new(dims.to_vec()).unwrap();
        DArray::new(
            StrideLayout::dense(shape, 0, Order::C),
            Storage::from_vec(values, SimdConfig::with_vector_bytes(16)),
        )
        .unwrap()
    }

    #[test]
    fn test_sum_prod_mean() {
        let a = arr(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert_eq!(a.sum().unwrap(), 10.0);
        assert_eq!(a.prod().unwrap(), 24.0);
        assert_eq!(a.mean().unwrap(), 2.5);
        // a column view
        assert_eq!(a.narrow(1, false, 1, 2).unwrap().sum().unwrap(), 6.0);
    }

    #[test]
    fn test_integer_reductions() {
        let a = arr(vec![100i8, 100, -3], &[3]);
        assert_eq!(a.sum().unwrap(), -59);
        assert_eq!(a.min().unwrap(), -3);
        assert_eq!(a.max().unwrap(), 100);
        assert!(a.mean().is_err());
    }

    #[test]
    fn test_min_max_propagate_nan() {
        let a = arr(vec![1.0f32, f32::NAN, -2.0], &[3]);
        assert!(a.min().unwrap().is_nan());
        assert!(a.max().unwrap().is_nan());
        assert_eq!(a.nan_count().unwrap(), 1);
    }

    #[test]
    fn test_counts() {
        let a = arr(vec![0i32, 5, 0, 0], &[4]);
        assert_eq!(a.zero_count().unwrap(), 3);
        assert_eq!(a.nan_count().unwrap(), 0);
    }

    #[test]
    fn test_trace() {
        let a = arr((0..9).map(|i| i as f64).collect(), &[3, 3]);
        assert_eq!(a.trace().unwrap(), 12.0);
        assert_eq!(a.t().trace().unwrap(), 12.0);
        assert!(arr(vec![1.0; 6], &[2, 3]).trace().is_err());
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_nan_skipping() {
        let a = arr(vec![1.0, f64::NAN, 3.0, f64::NAN, -2.0, 4.0], &[2, 3]);
        assert_eq!(a.nan_sum().unwrap(), 6.0);
        assert_eq!(a.nan_prod().unwrap(), -24.0);
        assert_eq!(a.nan_min().unwrap(), -2.0);
        assert_eq!(a.nan_max().unwrap(), 4.0);
        assert_eq!(a.nan_mean().unwrap(), 1.5);
        assert!(a.sum().unwrap().is_nan());

        let all_nan = arr(vec![f32::NAN; 3], &[3]);
        assert!(all_nan.nan_max().unwrap().is_nan());
        assert_eq!(all_nan.nan_sum().unwrap(), 0.0);

        let ints = arr(vec![4i32, -1, 9], &[3]);
        assert_eq!(ints.nan_min().unwrap(), -1);
        assert_eq!(ints.nan_sum().unwrap(), 12);
        assert!(ints.nan_mean().is_err());
    }

    #[test]
    fn test_var_and_std() {
        let a = arr(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert!(close(a.var(0).unwrap(), 1.25));
        assert!(close(a.var(1).unwrap(), 5.0 / 3.0));
        assert!(close(a.std(0).unwrap(), 1.25f64.sqrt()));
        // a strided view gives the same answer as a dense copy
        assert!(close(a.t().var(1).unwrap(), 5.0 / 3.0));
        assert!(a.var(4).is_err());
        assert!(arr(vec![1i32, 2], &[2]).var(0).is_err());
    }

    #[test]
    fn test_norms() {
        let a = arr(vec![3.0f32, -4.0], &[2]);
        assert_eq!(a.norm(0.0).unwrap(), 2.0);
        assert_eq!(a.norm(1.0).unwrap(), 7.0);
        assert_eq!(a.norm(2.0).unwrap(), 5.0);
        assert!((a.norm(3.0).unwrap() - 91f32.cbrt()).abs() < 1e-5);
        assert!(a.norm(-1.0).is_err());

        a.normalize_(2.0).unwrap();
        assert_eq!(a.get(&[1]).unwrap(), -0.8);
    }

    #[test]
    fn test_reductions_along_axis() {
        // [[0, 1, 2], [3, 4, 5]]
        let a = arr((0..6).map(|i| i as f64).collect(), &[2, 3]);
        let rows = a.sum_axis(1).unwrap();
        assert_eq!(rows.dims(), &[2]);
        assert_eq!(rows.to_vec(Order::C).unwrap(), vec![3.0, 12.0]);

        let cols = a.sum_axis(0).unwrap();
        assert_eq!(cols.to_vec(Order::C).unwrap(), vec![3.0, 5.0, 7.0]);
        assert_eq!(a.mean_axis(-1).unwrap().to_vec(Order::C).unwrap(), vec![1.0, 4.0]);
        assert_eq!(a.max_axis(0).unwrap().to_vec(Order::C).unwrap(), vec![3.0, 4.0, 5.0]);
        assert_eq!(a.min_axis(1).unwrap().to_vec(Order::C).unwrap(), vec![0.0, 3.0]);
        assert_eq!(a.var_axis(0, 0).unwrap().to_vec(Order::C).unwrap(), vec![2.25; 3]);

        // rank 1 reduces to a scalar
        let s = a.narrow(0, false, 1, 2).unwrap().sum_axis(0).unwrap();
        assert!(s.is_scalar());
        assert_eq!(s.get(&[]).unwrap(), 12.0);
        assert!(a.sum_axis(2).is_err());
    }

    #[test]
    fn test_axis_reduction_on_transposed_view() {
        let a = arr((0..6).map(|i| i as i32).collect(), &[2, 3]);
        let t = a.t();
        assert_eq!(t.sum_axis(1).unwrap().to_vec(Order::C).unwrap(), vec![3, 5, 7]);
        assert!(t.mean_axis(0).is_err());
    }

    #[test]
    fn test_reductions_over_trailing_shape() {
        let a = arr((0..24).map(|i| i as f64).collect(), &[2, 3, 4]);
        let s = a.sum_on((3, 4), false, Order::C).unwrap();
        assert_eq!(s.dims(), &[2]);
        assert_eq!(s.to_vec(Order::C).unwrap(), vec![66.0, 210.0]);

        let kept = a.mean_on(4, true, Order::F).unwrap();
        assert_eq!(kept.dims(), &[2, 3, 1]);
        assert!(kept.layout().is_f_ordered());
        assert_eq!(kept.get(&[1, 2, 0]).unwrap(), 21.5);

        let all = a.sum_on((2, 3, 4), false, Order::C).unwrap();
        assert!(all.is_scalar());
        assert_eq!(all.get(&[]).unwrap(), 276.0);

        let v = a.var_on(4, 1, false, Order::C).unwrap();
        assert_eq!(v.dims(), &[2, 3]);
        assert!(close(v.get(&[0, 0]).unwrap(), 5.0 / 3.0));

        assert!(a.sum_on((4, 3), false, Order::C).is_err());
        assert!(a.sum_on((1, 2, 3, 4), false, Order::C).is_err());
    }

    #[test]
    fn test_arg_reductions_use_c_positions() {
        let a = arr(vec![3.0, 9.0, 1.0, 9.0, 0.5, 2.0], &[2, 3]);
        assert_eq!(a.argmax().unwrap(), 1);
        assert_eq!(a.argmin().unwrap(), 4);
        // transposed: C order of t is 3, 9, 9, 0.5, 1, 2
        assert_eq!(a.t().argmin().unwrap(), 3);
    }
}
