use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within darray.
///
/// Every variant is a precondition violation reported synchronously by the
/// call that broke the contract. Nothing here is transient, so nothing is
/// ever retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A dimension size was zero when building a shape.
    #[error("invalid shape {dims:?}: every dimension must be positive")]
    InvalidShape { dims: Vec<usize> },

    /// Dimension sizes whose product does not fit in `usize`.
    #[error("shape {dims:?} holds more elements than can be addressed")]
    ShapeOverflow { dims: Vec<usize> },

    /// Two arrays were expected to have identical shapes.
    #[error("shapes do not match: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Axis index out of range for the array's rank.
    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: isize, rank: usize },

    /// Multi-index out of range, or wrong number of indices.
    #[error("index {index:?} out of range for shape {shape}")]
    IndexOutOfRange { index: Vec<usize>, shape: Shape },

    /// Physical pointer outside the storage buffer.
    #[error("pointer {ptr} out of range for storage of length {len}")]
    PointerOutOfRange { ptr: usize, len: usize },

    /// Reshape target does not hold the same number of elements.
    #[error("cannot reshape {src} elements into shape {dst_shape} ({dst} elements)")]
    ReshapeSizeMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Element kind of a storage or array differs from the requested one.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Persisted storage tag is not one of the known storage kinds.
    #[error("unknown storage tag: {0:?}")]
    UnknownStorageTag(String),

    /// Persisted bytes that cannot describe a valid value.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// Underlying reader or writer failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A storage lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Generic invalid argument not covered above.
    #[error("{0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create an invalid-argument error from any message.
    pub fn invalid(s: impl Into<String>) -> Self {
        Error::InvalidArgument(s.into())
    }
}

/// Convenience Result type used throughout darray.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted invalid-argument error.
/// Usage: `bail!("axis {} is not a unit axis", axis)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::InvalidArgument(format!($($arg)*)))
    };
}
