use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::iter::Chunk;
use crate::ops::{BinaryOp, UnaryOp};
use crate::shape::Order;
use crate::storage::{load_lanes, store_lanes};

use super::DArray;

// Elementwise kernels
//
// In-place unary kernels walk the receiver's chunks in natural order and
// process each run one hardware vector at a time: unit-stride runs are
// mapped through `chunks_exact_mut`, strided runs are gathered into a lane
// buffer, mapped, and scattered back.
//
// Binary kernels require identical shapes (no broadcasting). Both operands
// are walked in lockstep in the receiver's fast order (C when it is not
// dense), so that at least one side is read linearly. When both sides are
// unit-stride runs the loop becomes a plain lane-blocked zip over slices.
// When both operands view the same buffer through different layouts, the
// right-hand values are copied out first so no element is read after it has
// been overwritten.

/// Map one run of `buf` in place, `block.len()` lanes at a time.
fn map_run<T: Element>(buf: &mut [T], chunk: Chunk, block: &mut [T], f: &impl Fn(T) -> T) {
    let lanes = block.len();
    if chunk.step == 1 {
        let run = &mut buf[chunk.start..chunk.start + chunk.len];
        let mut blocks = run.chunks_exact_mut(lanes);
        for b in &mut blocks {
            for v in b.iter_mut() {
                *v = f(*v);
            }
        }
        for v in blocks.into_remainder() {
            *v = f(*v);
        }
        return;
    }
    let full = chunk.len / lanes * lanes;
    let mut i = 0;
    while i < full {
        let start = chunk.start + i * chunk.step;
        load_lanes(buf, start, chunk.step, block);
        for v in block.iter_mut() {
            *v = f(*v);
        }
        store_lanes(buf, start, chunk.step, block);
        i += lanes;
    }
    for j in full..chunk.len {
        let p = chunk.start + j * chunk.step;
        buf[p] = f(buf[p]);
    }
}

/// `dst[i] = f(dst[i], src[i])`, lane-blocked.
fn zip_slices<T: Element>(dst: &mut [T], src: &[T], lanes: usize, f: &impl Fn(T, T) -> T) {
    let mut d = dst.chunks_exact_mut(lanes);
    let mut s = src.chunks_exact(lanes);
    for (db, sb) in (&mut d).zip(&mut s) {
        for (x, &y) in db.iter_mut().zip(sb) {
            *x = f(*x, y);
        }
    }
    for (x, &y) in d.into_remainder().iter_mut().zip(s.remainder()) {
        *x = f(*x, y);
    }
}

impl<T: Element> DArray<T> {
    //  Generic kernels

    /// Replace every element `v` with `f(v)`.
    pub fn apply_(&self, f: impl Fn(T) -> T) -> Result<&Self> {
        let lanes = self.storage.vector_lanes();
        let mut block = vec![T::zero(); lanes];
        let mut buf = self.storage.write()?;
        for chunk in self.chunk_iter(Order::Natural) {
            map_run(&mut buf, chunk, &mut block, &f);
        }
        Ok(self)
    }

    /// Set every element to `f(i, ptr)`, where `i` is the element's logical
    /// position when walking in `order` and `ptr` its storage pointer.
    pub fn apply_indexed_(&self, order: Order, mut f: impl FnMut(usize, usize) -> T) -> Result<&Self> {
        let mut buf = self.storage.write()?;
        for (i, p) in self.ptr_iter(order).enumerate() {
            buf[p] = f(i, p);
        }
        Ok(self)
    }

    /// Apply a unary function in place.
    pub fn unary_(&self, op: UnaryOp) -> Result<&Self> {
        if op.floating_only() && T::DTYPE.is_integer() {
            return Err(Error::invalid(format!(
                "{:?} is only defined for floating kinds, not {}",
                op,
                T::DTYPE
            )));
        }
        self.apply_(|v| v.unary(op))
    }

    /// Apply a unary function to a copy.
    pub fn unary(&self, op: UnaryOp) -> Result<DArray<T>> {
        let out = self.copy(Order::Natural)?;
        out.unary_(op)?;
        Ok(out)
    }

    /// `self[i] = f(self[i], other[i])` for every element; shapes must match.
    pub fn zip_(&self, other: &DArray<T>, f: impl Fn(T, T) -> T) -> Result<&Self> {
        self.check_same_shape(other)?;
        let order = self.layout.storage_fast_order().unwrap_or_default();
        let lhs = self.ptr_iter(order);
        let rhs = other.ptr_iter(order);

        if self.shares_storage(other) {
            if self.layout == other.layout {
                let mut buf = self.storage.write()?;
                for p in lhs {
                    buf[p] = f(buf[p], buf[p]);
                }
            } else {
                let values = other.to_vec(order)?;
                let mut buf = self.storage.write()?;
                for (p, v) in lhs.zip(values) {
                    buf[p] = f(buf[p], v);
                }
            }
            return Ok(self);
        }

        let src = other.storage.read()?;
        let mut buf = self.storage.write()?;
        if let (Some((a, 1)), Some((b, 1))) = (lhs.linear(), rhs.linear()) {
            let n = self.size();
            zip_slices(&mut buf[a..a + n], &src[b..b + n], self.storage.vector_lanes(), &f);
        } else {
            for (p, q) in lhs.zip(rhs) {
                buf[p] = f(buf[p], src[q]);
            }
        }
        Ok(self)
    }

    /// Apply a binary function in place; shapes must match.
    pub fn binary_(&self, op: BinaryOp, other: &DArray<T>) -> Result<&Self> {
        self.zip_(other, |a, b| a.binary(op, b))
    }

    /// Apply a binary function into a copy of `self`.
    pub fn binary(&self, op: BinaryOp, other: &DArray<T>) -> Result<DArray<T>> {
        self.check_same_shape(other)?;
        let out = self.copy(Order::Natural)?;
        out.binary_(op, other)?;
        Ok(out)
    }

    /// Combine every element with a scalar in place.
    pub fn binary_scalar_(&self, op: BinaryOp, value: T) -> Result<&Self> {
        self.apply_(|v| v.binary(op, value))
    }

    pub fn binary_scalar(&self, op: BinaryOp, value: T) -> Result<DArray<T>> {
        let out = self.copy(Order::Natural)?;
        out.binary_scalar_(op, value)?;
        Ok(out)
    }

    //  Powers and activations

    /// Raise every element to the power `p`, computed in double precision.
    pub fn pow_(&self, p: f64) -> Result<&Self> {
        self.apply_(|v| T::from_f64(v.to_f64().powf(p)))
    }

    pub fn pow(&self, p: f64) -> Result<DArray<T>> {
        let out = self.copy(Order::Natural)?;
        out.pow_(p)?;
        Ok(out)
    }

    /// Softmax over all elements, shifted by the maximum for stability.
    pub fn softmax_(&self) -> Result<&Self> {
        self.check_floating("softmax")?;
        let max = self.max()?;
        self.sub_scalar_(max)?.exp_()?;
        let total = self.sum()?;
        self.div_scalar_(total)
    }

    pub fn softmax(&self) -> Result<DArray<T>> {
        let out = self.copy(Order::Natural)?;
        out.softmax_()?;
        Ok(out)
    }

    /// Logarithm of the softmax over all elements.
    pub fn logsoftmax_(&self) -> Result<&Self> {
        self.check_floating("logsoftmax")?;
        let max = self.max()?;
        self.sub_scalar_(max)?;
        let log_total = self.exp()?.sum()?.unary(UnaryOp::Log);
        self.sub_scalar_(log_total)
    }

    pub fn logsoftmax(&self) -> Result<DArray<T>> {
        let out = self.copy(Order::Natural)?;
        out.logsoftmax_()?;
        Ok(out)
    }

    pub(super) fn check_floating(&self, what: &str) -> Result<()> {
        if T::DTYPE.is_integer() {
            return Err(Error::invalid(format!(
                "{} is only defined for floating kinds, not {}",
                what,
                T::DTYPE
            )));
        }
        Ok(())
    }

    //  Fill and clamp

    /// Set every element to `value`.
    pub fn fill_(&self, value: T) -> Result<&Self> {
        let mut buf = self.storage.write()?;
        for chunk in self.chunk_iter(Order::Natural) {
            if chunk.step == 1 {
                buf[chunk.start..chunk.start + chunk.len].fill(value);
            } else {
                for p in chunk.pointers() {
                    buf[p] = value;
                }
            }
        }
        Ok(self)
    }

    /// Replace NaN elements with `value`; no-op for integer kinds.
    pub fn fill_nan_(&self, value: T) -> Result<&Self> {
        if T::DTYPE.is_integer() {
            return Ok(self);
        }
        self.apply_(|v| if v.is_nan() { value } else { v })
    }

    /// Limit every element to `min..=max`; NaN elements are left alone.
    pub fn clamp_(&self, min: T, max: T) -> Result<&Self> {
        if min > max {
            return Err(Error::invalid(format!(
                "clamp bounds out of order: {} > {}",
                min, max
            )));
        }
        self.apply_(|v| {
            if v < min {
                min
            } else if v > max {
                max
            } else {
                v
            }
        })
    }
}

macro_rules! unary_methods {
    ($($copy:ident, $inplace:ident => $op:ident;)*) => {
        impl<T: Element> DArray<T> {
            $(
                pub fn $inplace(&self) -> Result<&Self> {
                    self.unary_(UnaryOp::$op)
                }

                pub fn $copy(&self) -> Result<DArray<T>> {
                    self.unary(UnaryOp::$op)
                }
            )*
        }
    };
}

unary_methods! {
    abs, abs_ => Abs;
    neg, neg_ => Neg;
    sqr, sqr_ => Sqr;
    signum, signum_ => Signum;
    floor, floor_ => Floor;
    ceil, ceil_ => Ceil;
    round, round_ => Round;
    rint, rint_ => Rint;
    sqrt, sqrt_ => Sqrt;
    log, log_ => Log;
    log1p, log1p_ => Log1p;
    exp, exp_ => Exp;
    expm1, expm1_ => Expm1;
    sin, sin_ => Sin;
    cos, cos_ => Cos;
    tan, tan_ => Tan;
    asin, asin_ => Asin;
    acos, acos_ => Acos;
    atan, atan_ => Atan;
    sinh, sinh_ => Sinh;
    cosh, cosh_ => Cosh;
    tanh, tanh_ => Tanh;
    sigmoid, sigmoid_ => Sigmoid;
}

// Binary min/max are `minimum`/`maximum`; `min`/`max` are reductions.
macro_rules! binary_methods {
    ($($copy:ident, $inplace:ident, $scalar:ident, $scalar_inplace:ident => $op:ident;)*) => {
        impl<T: Element> DArray<T> {
            $(
                pub fn $inplace(&self, other: &DArray<T>) -> Result<&Self> {
                    self.binary_(BinaryOp::$op, other)
                }

                pub fn $copy(&self, other: &DArray<T>) -> Result<DArray<T>> {
                    self.binary(BinaryOp::$op, other)
                }

                pub fn $scalar_inplace(&self, value: T) -> Result<&Self> {
                    self.binary_scalar_(BinaryOp::$op, value)
                }

                pub fn $scalar(&self, value: T) -> Result<DArray<T>> {
                    self.binary_scalar(BinaryOp::$op, value)
                }
            )*
        }
    };
}

binary_methods! {
    add, add_, add_scalar, add_scalar_ => Add;
    sub, sub_, sub_scalar, sub_scalar_ => Sub;
    mul, mul_, mul_scalar, mul_scalar_ => Mul;
    div, div_, div_scalar, div_scalar_ => Div;
    minimum, minimum_, minimum_scalar, minimum_scalar_ => Min;
    maximum, maximum_, maximum_scalar, maximum_scalar_ => Max;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StrideLayout;
    use crate::shape::Shape;
    use crate::simd::SimdConfig;
    use crate::storage::Storage;
    use rstest::rstest;

    fn arr<T: Element>(values: Vec<T>, dims: &[usize], simd: SimdConfig) -> DArray<T> {
        let shape = Shape::new(dims.to_vec()).unwrap();
        DArray::new(StrideLayout::dense(shape, 0, Order::C), Storage::from_vec(values, simd)).unwrap()
    }

    fn seq(n: usize, dims: &[usize]) -> DArray<f64> {
        arr((0..n).map(|i| i as f64).collect(), dims, SimdConfig::with_vector_bytes(32))
    }

    #[rstest]
    #[case(SimdConfig::scalar())]
    #[case(SimdConfig::with_vector_bytes(16))]
    #[case(SimdConfig::with_vector_bytes(64))]
    fn test_unary_independent_of_lane_width(#[case] simd: SimdConfig) {
        let a = arr((0..11).map(|i| i as f64 - 5.0).collect(), &[11], simd);
        a.abs_().unwrap().sqr_().unwrap();
        let expected: Vec<f64> = (0..11).map(|i| ((i as f64) - 5.0).powi(2)).collect();
        assert_eq!(a.to_vec(Order::C).unwrap(), expected);
    }

    #[test]
    fn test_unary_on_strided_view() {
        let a = seq(20, &[5, 4]);
        // one column: a run of 5 elements, 4 apart
        let col = a.narrow(1, false, 2, 3).unwrap();
        col.neg_().unwrap();
        for i in 0..5 {
            assert_eq!(a.get(&[i, 2]).unwrap(), -((4 * i + 2) as f64));
            assert_eq!(a.get(&[i, 3]).unwrap(), (4 * i + 3) as f64);
        }

        a.t().mul_scalar_(2.0).unwrap();
        assert_eq!(a.get(&[1, 0]).unwrap(), 8.0);
    }

    #[test]
    fn test_copying_unary_leaves_source() {
        let a = seq(4, &[4]);
        let e = a.exp().unwrap();
        assert_eq!(a.get(&[1]).unwrap(), 1.0);
        assert!((e.get(&[1]).unwrap() - std::f64::consts::E).abs() < 1e-12);
    }

    #[test]
    fn test_floating_only_rejected_on_integers() {
        let a = arr(vec![1i32, 4, 9], &[3], SimdConfig::scalar());
        assert!(matches!(a.sqrt_(), Err(Error::InvalidArgument(_))));
        a.neg_().unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![-1, -4, -9]);
    }

    #[test]
    fn test_binary_requires_same_shape() {
        let a = seq(6, &[2, 3]);
        let b = seq(6, &[3, 2]);
        let err = a.add_(&b).unwrap_err();
        assert!(err.to_string().contains("shapes do not match"));
    }

    #[test]
    fn test_binary_mixed_layouts() {
        let a = seq(6, &[2, 3]);
        let b = seq(6, &[3, 2]).t();
        a.add_(&b).unwrap().mul_scalar_(10.0).unwrap();
        // b[i, j] = 2 * j + i
        assert_eq!(a.get(&[1, 2]).unwrap(), (5.0 + 5.0) * 10.0);
        assert_eq!(a.get(&[0, 1]).unwrap(), (1.0 + 2.0) * 10.0);
    }

    #[test]
    fn test_binary_aliasing_receiver() {
        let a = seq(4, &[4]);
        a.add_(&a.clone()).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_binary_with_own_transpose() {
        let a = arr(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2], SimdConfig::scalar());
        a.add_(&a.t()).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![2.0, 5.0, 5.0, 8.0]);

        let b = seq(9, &[3, 3]);
        b.t().sub_(&b).unwrap();
        // antisymmetric: b[i, j] = 3i + j - (3j + i)
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(b.get(&[i, j]).unwrap(), 2.0 * i as f64 - 2.0 * j as f64);
            }
        }
    }

    #[test]
    fn test_f_dense_receiver_with_c_dense_other() {
        // receiver is [2, 3] over F-ordered storage
        let a = seq(6, &[3, 2]).t();
        assert!(a.layout().is_f_ordered());
        let b = seq(6, &[2, 3]);
        assert!(b.layout().is_c_ordered());

        a.mul_(&b).unwrap();
        for i in 0..2 {
            for j in 0..3 {
                let lhs = (2 * j + i) as f64;
                let rhs = (3 * i + j) as f64;
                assert_eq!(a.get(&[i, j]).unwrap(), lhs * rhs);
            }
        }
        assert_eq!(b.to_vec(Order::C).unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_non_mutating_binary() {
        let a = seq(3, &[3]);
        let b = a.maximum_scalar(1.0).unwrap().sub(&a).unwrap();
        assert_eq!(b.to_vec(Order::C).unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(a.get(&[0]).unwrap(), 0.0);
    }

    #[test]
    fn test_integer_division_by_zero() {
        let a = arr(vec![6i32, 7], &[2], SimdConfig::scalar());
        let b = arr(vec![0i32, 2], &[2], SimdConfig::scalar());
        a.div_(&b).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![0, 3]);
    }

    #[test]
    fn test_fill_variants() {
        let a = arr(vec![1.0f32, f32::NAN, 5.0, -3.0], &[2, 2], SimdConfig::scalar());
        a.fill_nan_(0.0).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![1.0, 0.0, 5.0, -3.0]);
        a.clamp_(-1.0, 2.0).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![1.0, 0.0, 2.0, -1.0]);
        assert!(a.clamp_(1.0, 0.0).is_err());
        a.t().narrow(0, false, 0, 1).unwrap().fill_(9.0).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![9.0, 0.0, 9.0, -1.0]);
    }

    #[test]
    fn test_pow() {
        let a = arr(vec![1.0f64, 4.0, 9.0], &[3], SimdConfig::scalar());
        assert_eq!(a.pow(0.5).unwrap().to_vec(Order::C).unwrap(), vec![1.0, 2.0, 3.0]);
        let b = arr(vec![2i32, -3], &[2], SimdConfig::scalar());
        b.pow_(3.0).unwrap();
        assert_eq!(b.to_vec(Order::C).unwrap(), vec![8, -27]);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let a = arr(vec![1.0f64, 2.0, 3.0, 1000.0], &[2, 2], SimdConfig::with_vector_bytes(16));
        let s = a.softmax().unwrap();
        assert!((s.sum().unwrap() - 1.0).abs() < 1e-12);
        assert!((s.get(&[1, 1]).unwrap() - 1.0).abs() < 1e-12);

        let small = arr(vec![0.0f32, 0.0], &[2], SimdConfig::scalar());
        small.softmax_().unwrap();
        assert_eq!(small.to_vec(Order::C).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_logsoftmax_matches_log_of_softmax() {
        let a = seq(5, &[5]);
        let ls = a.logsoftmax().unwrap();
        let expected = a.softmax().unwrap().log().unwrap();
        for (x, y) in ls.to_vec(Order::C).unwrap().iter().zip(expected.to_vec(Order::C).unwrap()) {
            assert!((x - y).abs() < 1e-12);
        }
        let ints = arr(vec![1i32, 2], &[2], SimdConfig::scalar());
        assert!(matches!(ints.softmax(), Err(Error::InvalidArgument(_))));
        assert!(ints.logsoftmax_().is_err());
    }

    #[test]
    fn test_sigmoid_and_rint() {
        let a = arr(vec![-0.5f64, 0.0, 2.5], &[3], SimdConfig::scalar());
        assert_eq!(a.rint().unwrap().to_vec(Order::C).unwrap(), vec![0.0, 0.0, 2.0]);
        assert_eq!(a.round().unwrap().to_vec(Order::C).unwrap(), vec![-1.0, 0.0, 3.0]);
        assert_eq!(a.sigmoid().unwrap().get(&[1]).unwrap(), 0.5);
        let ints = arr(vec![3i32], &[1], SimdConfig::scalar());
        assert!(ints.sigmoid_().is_err());
    }

    #[test]
    fn test_apply_indexed_positions() {
        let a = arr(vec![0i32; 6], &[2, 3], SimdConfig::scalar());
        a.apply_indexed_(Order::F, |i, _| i as i32).unwrap();
        assert_eq!(a.to_vec(Order::C).unwrap(), vec![0, 2, 4, 1, 3, 5]);
    }
}
