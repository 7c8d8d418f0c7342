use crate::dtype::{DType, Element, Scalar};
use crate::error::{Error, Result};
use crate::layout::StrideLayout;
use crate::shape::{Order, Shape};
use crate::storage::AnyStorage;

use super::DArray;

// AnyArray — A DArray whose element kind is only known at runtime
//
// Code that receives a DType tag (a file header, a user option) branches
// exactly once by matching on AnyArray and then runs the fully typed
// DArray<T> code path.

/// A DArray of any element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyArray {
    Byte(DArray<i8>),
    Int(DArray<i32>),
    Float(DArray<f32>),
    Double(DArray<f64>),
}

/// Run `$body` with `$a` bound to the typed array inside `$any`.
macro_rules! with_array {
    ($any:expr, $a:ident => $body:expr) => {
        match $any {
            AnyArray::Byte($a) => $body,
            AnyArray::Int($a) => $body,
            AnyArray::Float($a) => $body,
            AnyArray::Double($a) => $body,
        }
    };
}

impl AnyArray {
    pub fn dtype(&self) -> DType {
        match self {
            AnyArray::Byte(_) => DType::Byte,
            AnyArray::Int(_) => DType::Int,
            AnyArray::Float(_) => DType::Float,
            AnyArray::Double(_) => DType::Double,
        }
    }

    pub fn shape(&self) -> &Shape {
        with_array!(self, a => a.shape())
    }

    pub fn layout(&self) -> &StrideLayout {
        with_array!(self, a => a.layout())
    }

    pub fn rank(&self) -> usize {
        self.shape().rank()
    }

    pub fn size(&self) -> usize {
        self.shape().size()
    }

    /// Handle to the underlying storage.
    pub fn storage(&self) -> AnyStorage {
        with_array!(self, a => a.storage().clone().into())
    }

    /// Read one element, tagged with its kind.
    pub fn get(&self, index: &[usize]) -> Result<Scalar> {
        with_array!(self, a => Ok(a.get(index)?.to_scalar()))
    }

    /// Write one element, casting `value` to this array's kind.
    pub fn set(&self, index: &[usize], value: Scalar) -> Result<()> {
        with_array!(self, a => a.set(index, Element::from_scalar(value)))
    }

    /// Dense copy in `order`.
    pub fn copy(&self, order: Order) -> Result<AnyArray> {
        with_array!(self, a => Ok(a.copy(order)?.into()))
    }

    /// Dense copy converted to `dtype`.
    pub fn cast(&self, dtype: DType, order: Order) -> Result<AnyArray> {
        with_array!(self, a => match dtype {
            DType::Byte => Ok(a.cast::<i8>(order)?.into()),
            DType::Int => Ok(a.cast::<i32>(order)?.into()),
            DType::Float => Ok(a.cast::<f32>(order)?.into()),
            DType::Double => Ok(a.cast::<f64>(order)?.into()),
        })
    }

    /// All elements in `order`, widened to f64.
    pub fn to_f64_vec(&self, order: Order) -> Result<Vec<f64>> {
        with_array!(self, a => Ok(a.to_vec(order)?.into_iter().map(Element::to_f64).collect()))
    }

    /// Recover the typed array; fails if the kinds differ.
    pub fn typed<T: Element>(self) -> Result<DArray<T>> {
        let got = self.dtype();
        T::from_any_array(self).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    /// Rebuild an array from a layout and a storage of any kind.
    pub fn from_storage(layout: StrideLayout, storage: AnyStorage) -> Result<AnyArray> {
        Ok(match storage {
            AnyStorage::Byte(s) => DArray::new(layout, s)?.into(),
            AnyStorage::Int(s) => DArray::new(layout, s)?.into(),
            AnyStorage::Float(s) => DArray::new(layout, s)?.into(),
            AnyStorage::Double(s) => DArray::new(layout, s)?.into(),
        })
    }
}

impl<T: Element> From<DArray<T>> for AnyArray {
    fn from(array: DArray<T>) -> Self {
        T::into_any_array(array)
    }
}
