use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::array::{AnyArray, DArray};
use crate::dtype::{DType, Element, Scalar};
use crate::error::{Error, Result};
use crate::layout::StrideLayout;
use crate::shape::{IntoShape, Order, Shape};
use crate::simd::SimdConfig;
use crate::storage::Storage;

// Manager — Factory for arrays
//
// Every array that does not come from a structural operation is created
// here. The manager owns the two process-level choices:
//
//   - the default order that `Order::Natural` resolves to at allocation;
//   - the SIMD descriptor handed to every Storage it allocates.
//
// BUILDERS:
//
//   `stack` and `cat` validate every input shape before allocating the
//   output, so a failed call never leaves a half-filled result behind. Both
//   then copy through views of the output: `stack` through the unit slices
//   of `chunk(axis, true, 1)`, `cat` through consecutive `narrow` ranges.
//
// RANDOM DRAWS:
//
//   `random` fills the fresh array by walking it in the requested order, so
//   the sequence of draws taken from the generator depends on the order.
//   The same seed and order always give the same array.

/// Configuration for a [`Manager`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Order used when a caller passes `Order::Natural` to an allocator.
    pub default_order: Order,
    /// Hardware vector descriptor for allocated storages.
    pub simd: SimdConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_order: Order::C,
            simd: SimdConfig::detect(),
        }
    }
}

impl ManagerConfig {
    pub fn default_order(mut self, order: Order) -> Self {
        self.default_order = order.auto_fc();
        self
    }

    pub fn simd(mut self, simd: SimdConfig) -> Self {
        self.simd = simd;
        self
    }
}

/// Creates arrays from shapes, values and existing buffers.
#[derive(Debug, Clone, Default)]
pub struct Manager {
    config: ManagerConfig,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        Manager { config }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Resolve an allocation order to C or F.
    fn order(&self, order: Order) -> Order {
        order.or(self.config.default_order).auto_fc()
    }

    fn alloc<T: Element>(&self, shape: Shape, order: Order) -> DArray<T> {
        let storage = Storage::zeros(shape.size(), self.config.simd);
        DArray::from_parts(StrideLayout::dense(shape, 0, self.order(order)), storage)
    }

    //  Creation

    /// Rank-0 array holding `value`.
    pub fn scalar<T: Element>(&self, value: T) -> DArray<T> {
        let storage = Storage::from_vec(vec![value], self.config.simd);
        DArray::from_parts(StrideLayout::dense(Shape::scalar(), 0, Order::C), storage)
    }

    pub fn zeros<T: Element>(&self, shape: impl IntoShape, order: Order) -> Result<DArray<T>> {
        Ok(self.alloc(shape.into_shape()?, order))
    }

    pub fn full<T: Element>(&self, shape: impl IntoShape, value: T, order: Order) -> Result<DArray<T>> {
        let shape = shape.into_shape()?;
        let storage = Storage::from_vec(vec![value; shape.size()], self.config.simd);
        Ok(DArray::from_parts(
            StrideLayout::dense(shape, 0, self.order(order)),
            storage,
        ))
    }

    /// `n x n` identity matrix.
    pub fn eye<T: Element>(&self, n: usize, order: Order) -> Result<DArray<T>> {
        let out = self.zeros::<T>((n, n), order)?;
        {
            let mut buf = out.storage().write()?;
            for i in 0..n {
                buf[out.layout().pointer(&[i, i])] = T::one();
            }
        }
        Ok(out)
    }

    /// Element at C-order position `i` holds `i`, whatever the storage order.
    pub fn seq<T: Element>(&self, shape: impl IntoShape, order: Order) -> Result<DArray<T>> {
        let out = self.zeros::<T>(shape, order)?;
        out.apply_indexed_(Order::C, |i, _| T::from_index(i))?;
        Ok(out)
    }

    /// Fill with draws from `dist`, taken while walking the array in `order`.
    pub fn random<T, D, R>(&self, shape: impl IntoShape, dist: &D, rng: &mut R, order: Order) -> Result<DArray<T>>
    where
        T: Element,
        D: Distribution<f64>,
        R: Rng + ?Sized,
    {
        let order = self.order(order);
        let out = self.zeros::<T>(shape, order)?;
        out.apply_indexed_(order, |_, _| T::from_f64(dist.sample(&mut *rng)))?;
        Ok(out)
    }

    /// Uniform draws in `[0, 1)`.
    pub fn random_uniform<T, R>(&self, shape: impl IntoShape, rng: &mut R, order: Order) -> Result<DArray<T>>
    where
        T: Element,
        R: Rng + ?Sized,
    {
        self.random(shape, &Uniform::new(0.0, 1.0), rng, order)
    }

    /// Normal draws with the given mean and standard deviation.
    pub fn random_normal<T, R>(
        &self,
        shape: impl IntoShape,
        mean: f64,
        std_dev: f64,
        rng: &mut R,
        order: Order,
    ) -> Result<DArray<T>>
    where
        T: Element,
        R: Rng + ?Sized,
    {
        let normal = Normal::new(mean, std_dev)
            .map_err(|e| Error::invalid(format!("normal({mean}, {std_dev}): {e}")))?;
        self.random(shape, &normal, rng, order)
    }

    //  Wrapping existing buffers

    /// Wrap a storage under an explicit layout, without copying.
    pub fn stride<T: Element>(&self, layout: StrideLayout, storage: Storage<T>) -> Result<DArray<T>> {
        DArray::new(layout, storage)
    }

    /// Take ownership of `values`, read as a dense array in `order`.
    pub fn wrap<T: Element>(&self, shape: impl IntoShape, order: Order, values: Vec<T>) -> Result<DArray<T>> {
        let shape = shape.into_shape()?;
        if values.len() != shape.size() {
            return Err(Error::invalid(format!(
                "{} values cannot fill shape {} ({} elements)",
                values.len(),
                shape,
                shape.size()
            )));
        }
        let layout = StrideLayout::dense(shape, 0, self.order(order));
        Ok(DArray::from_parts(layout, Storage::from_vec(values, self.config.simd)))
    }

    //  Builders

    /// Stack equally shaped arrays along a new axis inserted at `axis`.
    pub fn stack<T: Element>(&self, order: Order, axis: usize, arrays: &[DArray<T>]) -> Result<DArray<T>> {
        let first = arrays
            .first()
            .ok_or_else(|| Error::invalid("stack needs at least one array"))?;
        let shape = first.shape();
        if axis > shape.rank() {
            return Err(Error::AxisOutOfRange {
                axis: axis as isize,
                rank: shape.rank() + 1,
            });
        }
        for a in &arrays[1..] {
            first.check_same_shape(a)?;
        }

        let mut dims = shape.dims().to_vec();
        dims.insert(axis, arrays.len());
        let out = self.alloc::<T>(Shape::new(dims)?, order);
        log::debug!(
            "stack {} arrays of shape {} along axis {} into {}",
            arrays.len(),
            shape,
            axis,
            out.shape()
        );

        let slices = out.chunk(axis as isize, true, 1)?;
        for (slice, src) in slices.iter().zip(arrays) {
            src.copy_to(&slice.squeeze_axis(axis as isize)?)?;
        }
        Ok(out)
    }

    /// Concatenate arrays along an existing `axis`; every other axis must
    /// agree.
    pub fn cat<T: Element>(&self, order: Order, axis: usize, arrays: &[DArray<T>]) -> Result<DArray<T>> {
        let first = arrays
            .first()
            .ok_or_else(|| Error::invalid("cat needs at least one array"))?;
        let rank = first.rank();
        if axis >= rank {
            return Err(Error::AxisOutOfRange {
                axis: axis as isize,
                rank,
            });
        }
        let others = |s: &Shape| s.narrow_dims(axis);
        let mut total = 0;
        for a in arrays {
            if a.rank() != rank || others(a.shape()) != others(first.shape()) {
                return Err(Error::ShapeMismatch {
                    expected: first.shape().clone(),
                    got: a.shape().clone(),
                });
            }
            total += a.dims()[axis];
        }

        let mut dims = first.dims().to_vec();
        dims[axis] = total;
        let out = self.alloc::<T>(Shape::new(dims)?, order);
        log::debug!(
            "cat {} arrays along axis {} into {}",
            arrays.len(),
            axis,
            out.shape()
        );

        let mut start = 0;
        for a in arrays {
            let end = start + a.dims()[axis];
            a.copy_to(&out.narrow(axis as isize, true, start, end)?)?;
            start = end;
        }
        Ok(out)
    }

    //  Runtime element kind

    /// Zeros of a kind chosen at runtime.
    pub fn zeros_dyn(&self, dtype: DType, shape: impl IntoShape, order: Order) -> Result<AnyArray> {
        let shape = shape.into_shape()?;
        Ok(match dtype {
            DType::Byte => self.alloc::<i8>(shape, order).into(),
            DType::Int => self.alloc::<i32>(shape, order).into(),
            DType::Float => self.alloc::<f32>(shape, order).into(),
            DType::Double => self.alloc::<f64>(shape, order).into(),
        })
    }

    /// `value` cast to `dtype` in every element.
    pub fn full_dyn(&self, dtype: DType, shape: impl IntoShape, value: Scalar, order: Order) -> Result<AnyArray> {
        Ok(match dtype {
            DType::Byte => self.full(shape, i8::from_scalar(value), order)?.into(),
            DType::Int => self.full(shape, i32::from_scalar(value), order)?.into(),
            DType::Float => self.full(shape, f32::from_scalar(value), order)?.into(),
            DType::Double => self.full(shape, f64::from_scalar(value), order)?.into(),
        })
    }

    /// `seq` of a kind chosen at runtime.
    pub fn seq_dyn(&self, dtype: DType, shape: impl IntoShape, order: Order) -> Result<AnyArray> {
        Ok(match dtype {
            DType::Byte => self.seq::<i8>(shape, order)?.into(),
            DType::Int => self.seq::<i32>(shape, order)?.into(),
            DType::Float => self.seq::<f32>(shape, order)?.into(),
            DType::Double => self.seq::<f64>(shape, order)?.into(),
        })
    }
}
