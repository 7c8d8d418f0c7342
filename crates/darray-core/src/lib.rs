//! # darray-core
//!
//! N-dimensional typed arrays over flat, shared, strided storage.
//!
//! This crate provides:
//! - [`DArray`] — an array view: a [`StrideLayout`] over a shared [`Storage`]
//! - [`Shape`] / [`StrideLayout`] — dimensions, strides, offset and the
//!   zero-copy layout algebra (transpose, narrow, squeeze, reshape-as-view)
//! - [`DType`] / [`Element`] — byte, int, float and double element kinds
//! - [`PointerIterator`] / [`ChunkIterator`] — bulk traversal in C, F or
//!   natural order
//! - [`Manager`] — factory for zeros, eye, seq, random, stack and cat
//! - [`AnyArray`] / [`AnyStorage`] — runtime-dispatched element kind
// - shape, dtype, simd: value types, no storage
// - storage: the shared primitive buffer and its persistence
// - layout, iter: pointer arithmetic over a storage
// - array: DArray and its kernels
// - manager: creation and builders

pub mod array;
pub mod dtype;
pub mod error;
pub mod iter;
pub mod layout;
pub mod manager;
pub mod ops;
pub mod shape;
pub mod simd;
pub mod storage;

pub use array::{AnyArray, DArray};
pub use dtype::{DType, Element, Scalar};
pub use error::{Error, Result};
pub use iter::{Chunk, ChunkIterator, IndexIterator, PointerIterator};
pub use layout::StrideLayout;
pub use manager::{Manager, ManagerConfig};
pub use ops::{BinaryOp, UnaryOp};
pub use shape::{IntoShape, Order, Shape};
pub use simd::SimdConfig;
pub use storage::{AnyStorage, Storage};
