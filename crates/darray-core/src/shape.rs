use std::fmt;

use crate::error::{Error, Result};

// Shape — N-dimensional shape representation
//
// A Shape is the ordered list of dimension sizes of an array:
//   - Scalar: Shape([])          — rank 0, 1 element
//   - Vector: Shape([5])         — rank 1, 5 elements
//   - Matrix: Shape([3, 4])      — rank 2, 12 elements
//
// Every dimension is at least 1. Shapes never describe empty arrays, which
// keeps pointer arithmetic free of special cases downstream.
//
// The dense row-major (C) and column-major (F) strides are computed once at
// construction, so index <-> position conversion is a handful of divisions.

/// Logical traversal order of an array's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Row-major: the last axis varies fastest.
    #[default]
    C,
    /// Column-major: the first axis varies fastest.
    F,
    /// Whichever of C or F the storage is already dense in, else C.
    Natural,
}

impl Order {
    /// Resolve to a concrete allocation order: `Natural` becomes `fallback`.
    pub fn or(self, fallback: Order) -> Order {
        match self {
            Order::Natural => fallback,
            o => o,
        }
    }

    /// Resolve to C or F, mapping `Natural` to the default order (C).
    pub fn auto_fc(self) -> Order {
        self.or(Order::default())
    }
}

/// N-dimensional shape of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
    c_strides: Vec<usize>,
    f_strides: Vec<usize>,
}

impl Shape {
    /// Create a shape from dimension sizes. Fails if any dimension is zero
    /// or the element count overflows `usize`.
    pub fn new(dims: Vec<usize>) -> Result<Self> {
        if dims.iter().any(|&d| d == 0) {
            return Err(Error::InvalidShape { dims });
        }
        if dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).is_none() {
            return Err(Error::ShapeOverflow { dims });
        }
        Ok(Self::from_positive(dims))
    }

    /// Build from dimensions already known to be positive with an
    /// addressable product, such as those of another shape with axes
    /// removed or permuted.
    pub(crate) fn from_positive(dims: Vec<usize>) -> Self {
        let rank = dims.len();
        let mut c_strides = vec![1usize; rank];
        for i in (0..rank.saturating_sub(1)).rev() {
            c_strides[i] = c_strides[i + 1] * dims[i + 1];
        }
        let mut f_strides = vec![1usize; rank];
        for i in 1..rank {
            f_strides[i] = f_strides[i - 1] * dims[i - 1];
        }
        Shape {
            dims,
            c_strides,
            f_strides,
        }
    }

    /// The scalar shape (rank 0, one element).
    pub fn scalar() -> Self {
        Shape {
            dims: vec![],
            c_strides: vec![],
            f_strides: vec![],
        }
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions (0 for scalar).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. A scalar shape has 1 element.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Size of axis `i`; negative values count from the end.
    pub fn dim(&self, i: isize) -> Result<usize> {
        let axis = self.axis(i)?;
        Ok(self.dims[axis])
    }

    /// Normalize a possibly negative axis into `0..rank`.
    pub fn axis(&self, i: isize) -> Result<usize> {
        let rank = self.rank() as isize;
        let axis = if i < 0 { i + rank } else { i };
        if axis < 0 || axis >= rank {
            return Err(Error::AxisOutOfRange {
                axis: i,
                rank: self.rank(),
            });
        }
        Ok(axis as usize)
    }

    /// Number of axes with size 1.
    pub fn unit_dim_count(&self) -> usize {
        self.dims.iter().filter(|&&d| d == 1).count()
    }

    /// Dense strides for the given order (`Natural` means C).
    pub fn strides(&self, order: Order) -> &[usize] {
        match order {
            Order::F => &self.f_strides,
            _ => &self.c_strides,
        }
    }

    /// Convert a linear position into a multi-index.
    ///
    /// For shape [2, 3]: C position 4 is [1, 1], F position 4 is [0, 2].
    pub fn index(&self, order: Order, pos: usize) -> Vec<usize> {
        let mut pos = pos;
        let mut index = vec![0usize; self.rank()];
        let strides = self.strides(order);
        let rank = self.rank();
        for k in 0..rank {
            // slowest-varying axis first
            let i = if order == Order::F { rank - 1 - k } else { k };
            index[i] = pos / strides[i];
            pos %= strides[i];
        }
        index
    }

    /// Convert a multi-index into a linear position (inverse of [`Shape::index`]).
    pub fn position(&self, order: Order, index: &[usize]) -> usize {
        index
            .iter()
            .zip(self.strides(order))
            .map(|(&i, &s)| i * s)
            .sum()
    }

    /// Dimensions with axis `axis` removed.
    pub(crate) fn narrow_dims(&self, axis: usize) -> Vec<usize> {
        let mut dims = self.dims.clone();
        dims.remove(axis);
        dims
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// IntoShape — fallible conversion accepted by every constructor
//
// These let you write `manager.zeros::<f64>((3, 4), Order::C)` instead of
// `Shape::new(vec![3, 4])?`. The conversion still validates dimensions.

/// Anything that can be turned into a validated [`Shape`].
pub trait IntoShape {
    fn into_shape(self) -> Result<Shape>;
}

impl IntoShape for Shape {
    fn into_shape(self) -> Result<Shape> {
        Ok(self)
    }
}

impl IntoShape for &Shape {
    fn into_shape(self) -> Result<Shape> {
        Ok(self.clone())
    }
}

impl IntoShape for () {
    fn into_shape(self) -> Result<Shape> {
        Ok(Shape::scalar())
    }
}

impl IntoShape for usize {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(vec![self])
    }
}

impl IntoShape for (usize,) {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(vec![self.0])
    }
}

impl IntoShape for (usize, usize) {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(vec![self.0, self.1])
    }
}

impl IntoShape for (usize, usize, usize) {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(vec![self.0, self.1, self.2])
    }
}

impl IntoShape for (usize, usize, usize, usize) {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(vec![self.0, self.1, self.2, self.3])
    }
}

impl<const N: usize> IntoShape for [usize; N] {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(self.to_vec())
    }
}

impl IntoShape for Vec<usize> {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(self)
    }
}

impl IntoShape for &[usize] {
    fn into_shape(self) -> Result<Shape> {
        Shape::new(self.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = ().into_shape().unwrap();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.size(), 1);
        assert!(s.strides(Order::C).is_empty());
    }

    #[test]
    fn test_zero_dim_rejected() {
        assert!(matches!(
            Shape::new(vec![2, 0, 3]),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_element_count_overflow_rejected() {
        let huge = usize::MAX / 2 + 1;
        assert!(matches!(
            Shape::new(vec![huge, 2]),
            Err(Error::ShapeOverflow { .. })
        ));
        assert!(Shape::new(vec![huge, 1]).is_ok());
    }

    #[test]
    fn test_dense_strides() {
        let s = Shape::new(vec![2, 3, 4]).unwrap();
        assert_eq!(s.strides(Order::C), &[12, 4, 1]);
        assert_eq!(s.strides(Order::F), &[1, 2, 6]);
        assert_eq!(s.size(), 24);
    }

    #[test]
    fn test_negative_dim() {
        let s = Shape::new(vec![2, 3, 4]).unwrap();
        assert_eq!(s.dim(-1).unwrap(), 4);
        assert_eq!(s.dim(0).unwrap(), 2);
        assert!(s.dim(3).is_err());
        assert!(s.dim(-4).is_err());
    }

    #[test]
    fn test_index_position_roundtrip() {
        let s = Shape::new(vec![2, 3, 4]).unwrap();
        for order in [Order::C, Order::F] {
            for pos in 0..s.size() {
                let idx = s.index(order, pos);
                assert_eq!(s.position(order, &idx), pos);
            }
        }
        assert_eq!(s.index(Order::C, 5), vec![0, 1, 1]);
        assert_eq!(s.index(Order::F, 5), vec![1, 2, 0]);
    }

    #[test]
    fn test_display() {
        let s = (3, 4).into_shape().unwrap();
        assert_eq!(format!("{}", s), "[3, 4]");
    }
}
