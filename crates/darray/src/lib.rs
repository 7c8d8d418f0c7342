//! # darray
//!
//! N-dimensional typed arrays with zero-copy views over shared strided
//! storage.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use darray::prelude::*;
//!
//! let m = Manager::default();
//! let a = m.seq::<f64>((2, 2), Order::C).unwrap();
//! let t = a.t();
//! assert!(t.shares_storage(&a));
//! assert_eq!(t.to_vec(Order::C).unwrap(), vec![0.0, 2.0, 1.0, 3.0]);
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `darray-core` | Shape, DType, Storage, StrideLayout, iterators, DArray, Manager |
//! | `darray` | Re-exports, prelude, named-array archives |
//!
//! ## Modules
//!
//! - [`archive`] — save/load named arrays

/// Re-export core types.
pub use darray_core::{
    iter::{Chunk, ChunkIterator, IndexIterator, PointerIterator},
    AnyArray, AnyStorage, BinaryOp, DArray, DType, Element, Error, IntoShape, Manager,
    ManagerConfig, Order, Result, Scalar, Shape, SimdConfig, Storage, StrideLayout, UnaryOp,
};

/// Archive — save and load named arrays.
pub mod archive;

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::archive::{load_arrays, save_arrays};
    pub use crate::{
        AnyArray, DArray, DType, Element, Manager, ManagerConfig, Order, Scalar, Shape,
        SimdConfig, StrideLayout,
    };
}
