use crate::bail;
use crate::dtype::Element;
use crate::error::Result;
use crate::ops::BinaryOp;
use crate::shape::{Order, Shape};

use super::DArray;

// Linear algebra on rank-1 and rank-2 arrays
//
// Products read both operands directly through their strides, so transposed
// and narrowed views multiply without a copy. Accumulation stays in the
// element kind; integer kinds wrap. When both operands view one buffer a
// single read guard serves both.

/// `sum a[a0 + k * sa] * b[b0 + k * sb]` for `k` in `0..n`.
fn dot<T: Element>(a: &[T], a0: usize, sa: usize, b: &[T], b0: usize, sb: usize, n: usize) -> T {
    (0..n).fold(T::zero(), |acc, k| {
        acc.binary(BinaryOp::Add, a[a0 + k * sa].binary(BinaryOp::Mul, b[b0 + k * sb]))
    })
}

impl<T: Element> DArray<T> {
    /// Dot product of two rank-1 arrays of equal length.
    pub fn inner(&self, other: &DArray<T>) -> Result<T> {
        if self.rank() != 1 {
            bail!("inner product needs rank-1 operands, got shape {}", self.shape());
        }
        self.inner_range(other, 0, self.size())
    }

    /// Dot product restricted to positions `start..end`.
    pub fn inner_range(&self, other: &DArray<T>, start: usize, end: usize) -> Result<T> {
        if self.rank() != 1 || other.rank() != 1 {
            bail!(
                "inner product needs rank-1 operands, got shapes {} and {}",
                self.shape(),
                other.shape()
            );
        }
        self.check_same_shape(other)?;
        if start >= end || end > self.size() {
            bail!("inner product range {}..{} outside 0..{}", start, end, self.size());
        }
        let (sa, sb) = (self.layout.strides()[0], other.layout.strides()[0]);
        let a0 = self.layout.offset() + start * sa;
        let b0 = other.layout.offset() + start * sb;

        let a = self.storage.read()?;
        let b_guard;
        let b: &[T] = if self.shares_storage(other) {
            &a
        } else {
            b_guard = other.storage.read()?;
            &b_guard
        };
        Ok(dot(&a, a0, sa, b, b0, sb, end - start))
    }

    /// Matrix-vector product of a `[m, n]` matrix and a length-`n` vector.
    pub fn mv(&self, v: &DArray<T>) -> Result<DArray<T>> {
        if self.rank() != 2 || v.rank() != 1 || self.dims()[1] != v.dims()[0] {
            bail!(
                "cannot multiply matrix {} by vector {}",
                self.shape(),
                v.shape()
            );
        }
        let (m, n) = (self.dims()[0], self.dims()[1]);
        let (rs, cs) = (self.layout.strides()[0], self.layout.strides()[1]);
        let (v0, vs) = (v.layout.offset(), v.layout.strides()[0]);

        let a = self.storage.read()?;
        let b_guard;
        let b: &[T] = if self.shares_storage(v) {
            &a
        } else {
            b_guard = v.storage.read()?;
            &b_guard
        };
        let values = (0..m)
            .map(|i| dot(&a, self.layout.offset() + i * rs, cs, b, v0, vs, n))
            .collect();
        Ok(self.dense_from_vec(Shape::new(vec![m])?, Order::C, values))
    }

    /// Matrix product of `[m, n]` and `[n, p]`, stored in `order`.
    pub fn mm(&self, other: &DArray<T>, order: Order) -> Result<DArray<T>> {
        if self.rank() != 2 || other.rank() != 2 || self.dims()[1] != other.dims()[0] {
            bail!(
                "cannot multiply matrices of shapes {} and {}",
                self.shape(),
                other.shape()
            );
        }
        let (m, n, p) = (self.dims()[0], self.dims()[1], other.dims()[1]);
        let (ars, acs) = (self.layout.strides()[0], self.layout.strides()[1]);
        let (brs, bcs) = (other.layout.strides()[0], other.layout.strides()[1]);
        let (a0, b0) = (self.layout.offset(), other.layout.offset());
        log::trace!("mm {} x {}", self.shape(), other.shape());

        let order = match order {
            Order::F => Order::F,
            _ => Order::C,
        };
        let a = self.storage.read()?;
        let b_guard;
        let b: &[T] = if self.shares_storage(other) {
            &a
        } else {
            b_guard = other.storage.read()?;
            &b_guard
        };
        let mut values = Vec::with_capacity(m * p);
        let at = |i: usize, j: usize| dot(&a, a0 + i * ars, acs, b, b0 + j * bcs, brs, n);
        if order == Order::F {
            for j in 0..p {
                values.extend((0..m).map(|i| at(i, j)));
            }
        } else {
            for i in 0..m {
                values.extend((0..p).map(|j| at(i, j)));
            }
        }
        Ok(self.dense_from_vec(Shape::new(vec![m, p])?, order, values))
    }

    /// Outer product of two rank-1 arrays, `[m] x [p] -> [m, p]`.
    pub fn outer(&self, other: &DArray<T>) -> Result<DArray<T>> {
        if self.rank() != 1 || other.rank() != 1 {
            bail!(
                "outer product needs rank-1 operands, got shapes {} and {}",
                self.shape(),
                other.shape()
            );
        }
        self.unsqueeze(1)?.mm(&other.unsqueeze(0)?, Order::C)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::layout::StrideLayout;
    use crate::simd::SimdConfig;
    use crate::storage::Storage;
    use rstest::rstest;

    fn arr<T: Element>(values: Vec<T>, dims: &[usize]) -> DArray<T> {
        let shape = Shape::new(dims.to_vec()).unwrap();
        DArray::new(
            StrideLayout::dense(shape, 0, Order::C),
            Storage::from_vec(values, SimdConfig::with_vector_bytes(16)),
        )
        .unwrap()
    }

    fn seq(dims: &[usize]) -> DArray<f64> {
        let n = dims.iter().product::<usize>();
        arr((0..n).map(|i| i as f64).collect(), dims)
    }

    #[test]
    fn test_inner() {
        let a = arr(vec![1, 2, 3], &[3]);
        let b = arr(vec![4, -5, 6], &[3]);
        assert_eq!(a.inner(&b).unwrap(), 12);
        assert_eq!(a.inner_range(&b, 1, 3).unwrap(), 8);
        assert!(a.inner_range(&b, 2, 2).is_err());
        assert!(a.inner_range(&b, 0, 4).is_err());
        assert!(matches!(
            a.inner(&arr(vec![1, 2], &[2])),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_inner_with_itself_and_strided() {
        // column 1 of [[0, 1], [2, 3], [4, 5]] is [1, 3, 5]
        let m = seq(&[3, 2]);
        let col = m.narrow(1, false, 1, 2).unwrap();
        assert_eq!(col.inner(&col).unwrap(), 35.0);
        let row = m.t().narrow(0, false, 0, 1).unwrap();
        assert_eq!(col.inner(&row).unwrap(), 0.0 + 6.0 + 20.0);
    }

    #[test]
    fn test_mv() {
        let m = seq(&[2, 3]);
        let v = arr(vec![1.0, 0.0, -1.0], &[3]);
        assert_eq!(m.mv(&v).unwrap().to_vec(Order::C).unwrap(), vec![-2.0, -2.0]);
        // transposed: [3, 2] times [2]
        let w = arr(vec![1.0, 1.0], &[2]);
        assert_eq!(m.t().mv(&w).unwrap().to_vec(Order::C).unwrap(), vec![3.0, 5.0, 7.0]);
        assert!(m.mv(&w).is_err());
    }

    #[rstest]
    #[case(Order::C)]
    #[case(Order::F)]
    fn test_mm(#[case] order: Order) {
        let a = seq(&[2, 3]);
        let b = seq(&[3, 2]);
        let c = a.mm(&b, order).unwrap();
        assert_eq!(c.dims(), &[2, 2]);
        assert_eq!(c.to_vec(Order::C).unwrap(), vec![10.0, 13.0, 28.0, 40.0]);
        assert_eq!(c.layout().is_f_ordered(), order == Order::F);
    }

    #[test]
    fn test_mm_with_own_transpose() {
        let a = seq(&[2, 3]);
        let gram = a.mm(&a.t(), Order::C).unwrap();
        assert_eq!(gram.to_vec(Order::C).unwrap(), vec![5.0, 14.0, 14.0, 50.0]);
        assert!(!gram.shares_storage(&a));
        assert!(a.mm(&a, Order::C).is_err());
    }

    #[test]
    fn test_outer() {
        let u = arr(vec![1i32, 2], &[2]);
        let v = arr(vec![3i32, 4, 5], &[3]);
        let o = u.outer(&v).unwrap();
        assert_eq!(o.dims(), &[2, 3]);
        assert_eq!(o.to_vec(Order::C).unwrap(), vec![3, 4, 5, 6, 8, 10]);
        assert!(u.outer(&o).is_err());
    }
}
