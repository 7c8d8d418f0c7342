use std::cmp::Ordering;
use std::fmt;

use num_traits::{Float, One, Zero};

use crate::array::{AnyArray, DArray};
use crate::error::{Error, Result};
use crate::ops::{BinaryOp, UnaryOp};
use crate::simd::SimdConfig;
use crate::storage::{AnyStorage, Storage};

// DType — Supported numeric element kinds
//
//   BYTE   — signed 8-bit integer (i8)
//   INT    — signed 32-bit integer (i32)
//   FLOAT  — 32-bit IEEE float (f32)
//   DOUBLE — 64-bit IEEE float (f64)
//
// DType is the runtime tag; `Element` is its compile-time twin. Arrays are
// generic over `Element`, so every kernel is monomorphized per kind and no
// element is ever boxed. Code that only knows the tag at runtime branches once
// on `DType` (see `AnyArray`) and then runs fully typed.
//
// CASTING:
//
//   Narrowing conversions are total and deterministic:
//     float/double -> int   saturates, NaN becomes 0
//     float/double -> byte  goes through int, then keeps the low 8 bits
//     int -> byte           keeps the low 8 bits
//     double -> float       rounds to nearest
//   Widening is exact.

/// Runtime tag for an element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Byte,
    Int,
    Float,
    Double,
}

impl DType {
    /// All kinds, in widening order.
    pub const ALL: [DType; 4] = [DType::Byte, DType::Int, DType::Float, DType::Double];

    /// Case-insensitive lookup by id: "byte", "int", "float" or "double".
    pub fn from_id(name: &str) -> Result<DType> {
        match name.to_ascii_lowercase().as_str() {
            "byte" => Ok(DType::Byte),
            "int" => Ok(DType::Int),
            "float" => Ok(DType::Float),
            "double" => Ok(DType::Double),
            _ => Err(Error::invalid(format!("unknown dtype id: {name:?}"))),
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            DType::Byte => "byte",
            DType::Int => "int",
            DType::Float => "float",
            DType::Double => "double",
        }
    }

    /// Size of one element in bytes.
    pub fn byte_count(&self) -> usize {
        match self {
            DType::Byte => 1,
            DType::Int => 4,
            DType::Float => 4,
            DType::Double => 8,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DType::Byte | DType::Int)
    }

    pub fn is_floating(&self) -> bool {
        !self.is_integer()
    }

    /// Tag written ahead of a persisted storage of this kind.
    pub fn storage_tag(&self) -> &'static str {
        match self {
            DType::Byte => "ByteArrayStorage",
            DType::Int => "IntArrayStorage",
            DType::Float => "FloatArrayStorage",
            DType::Double => "DoubleArrayStorage",
        }
    }

    /// Inverse of [`DType::storage_tag`].
    pub fn from_storage_tag(tag: &str) -> Result<DType> {
        DType::ALL
            .into_iter()
            .find(|dt| dt.storage_tag() == tag)
            .ok_or_else(|| Error::UnknownStorageTag(tag.to_string()))
    }

    /// Number of SIMD lanes of this kind that fit one hardware vector.
    pub fn lanes(&self, simd: &SimdConfig) -> usize {
        simd.lanes_for(self.byte_count())
    }

    /// Cast a tagged value to this kind.
    pub fn cast(&self, value: Scalar) -> Scalar {
        match self {
            DType::Byte => Scalar::Byte(i8::from_scalar(value)),
            DType::Int => Scalar::Int(i32::from_scalar(value)),
            DType::Float => Scalar::Float(f32::from_scalar(value)),
            DType::Double => Scalar::Double(f64::from_scalar(value)),
        }
    }

    /// NaN predicate; constant false for integer kinds.
    pub fn is_nan(&self, value: Scalar) -> bool {
        match value {
            Scalar::Float(v) => self.is_floating() && v.is_nan(),
            Scalar::Double(v) => self.is_floating() && v.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A single value tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Byte(i8),
    Int(i32),
    Float(f32),
    Double(f64),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Byte(_) => DType::Byte,
            Scalar::Int(_) => DType::Int,
            Scalar::Float(_) => DType::Float,
            Scalar::Double(_) => DType::Double,
        }
    }

    pub fn to_f64(self) -> f64 {
        f64::from_scalar(self)
    }
}

// Element — Trait that connects Rust primitives to DType

/// Rust primitive types that can be stored in an array.
pub trait Element:
    Copy + Send + Sync + 'static + fmt::Debug + fmt::Display + PartialEq + PartialOrd + Default + Zero + One
{
    /// The matching runtime tag.
    const DTYPE: DType;

    /// Tag this value with its kind.
    fn to_scalar(self) -> Scalar;

    /// Convert from any kind, narrowing by the rules above.
    fn from_scalar(value: Scalar) -> Self;

    /// Apply a unary function. Floating-only functions are only called on
    /// floating kinds; callers check [`UnaryOp::floating_only`] first.
    fn unary(self, op: UnaryOp) -> Self;

    /// Apply a binary function; integer kinds wrap on overflow.
    fn binary(self, op: BinaryOp, rhs: Self) -> Self;

    /// Total ordering used by sorting and arg-reductions.
    fn natural_cmp(&self, other: &Self) -> Ordering;

    /// Append the little-endian bytes of `values` to `out`.
    fn write_le(values: &[Self], out: &mut Vec<u8>);

    /// Decode little-endian bytes; a trailing partial element is ignored.
    fn read_le(bytes: &[u8]) -> Vec<Self>;

    fn into_any_storage(storage: Storage<Self>) -> AnyStorage;

    fn from_any_storage(storage: AnyStorage) -> Option<Storage<Self>>;

    fn into_any_array(array: DArray<Self>) -> AnyArray;

    fn from_any_array(array: AnyArray) -> Option<DArray<Self>>;

    fn is_nan(self) -> bool {
        false
    }

    fn reverse_cmp(&self, other: &Self) -> Ordering {
        other.natural_cmp(self)
    }

    /// Cast from another element kind.
    fn cast<S: Element>(value: S) -> Self {
        Self::from_scalar(value.to_scalar())
    }

    /// Cast from a linear position, as used by `seq`.
    fn from_index(i: usize) -> Self {
        Self::from_scalar(Scalar::Int(i as i32))
    }

    fn from_f64(v: f64) -> Self {
        Self::from_scalar(Scalar::Double(v))
    }

    fn to_f64(self) -> f64 {
        f64::from_scalar(self.to_scalar())
    }

    fn natural_order() -> fn(&Self, &Self) -> Ordering {
        Self::natural_cmp
    }

    fn reverse_order() -> fn(&Self, &Self) -> Ordering {
        Self::reverse_cmp
    }
}

fn float_unary<F: Float>(v: F, op: UnaryOp) -> F {
    match op {
        UnaryOp::Abs => v.abs(),
        UnaryOp::Neg => -v,
        UnaryOp::Sqr => v * v,
        UnaryOp::Signum => {
            if v.is_nan() || v.is_zero() {
                v
            } else {
                v.signum()
            }
        }
        UnaryOp::Floor => v.floor(),
        UnaryOp::Ceil => v.ceil(),
        UnaryOp::Round => v.round(),
        UnaryOp::Rint => rint(v),
        UnaryOp::Sqrt => v.sqrt(),
        UnaryOp::Log => v.ln(),
        UnaryOp::Log1p => v.ln_1p(),
        UnaryOp::Exp => v.exp(),
        UnaryOp::Expm1 => v.exp_m1(),
        UnaryOp::Sin => v.sin(),
        UnaryOp::Cos => v.cos(),
        UnaryOp::Tan => v.tan(),
        UnaryOp::Asin => v.asin(),
        UnaryOp::Acos => v.acos(),
        UnaryOp::Atan => v.atan(),
        UnaryOp::Sinh => v.sinh(),
        UnaryOp::Cosh => v.cosh(),
        UnaryOp::Tanh => v.tanh(),
        UnaryOp::Sigmoid => F::one() / (F::one() + (-v).exp()),
    }
}

/// Round to the nearest integer, ties to even.
fn rint<F: Float>(v: F) -> F {
    let r = v.round();
    let half = F::one() / (F::one() + F::one());
    if (r - v).abs() == half && !(r * half).fract().is_zero() {
        r - v.signum()
    } else {
        r
    }
}

fn float_binary<F: Float>(a: F, op: BinaryOp, b: F) -> F {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        // NaN propagates, unlike Float::min/max
        BinaryOp::Min => {
            if a.is_nan() || b.is_nan() {
                F::nan()
            } else {
                a.min(b)
            }
        }
        BinaryOp::Max => {
            if a.is_nan() || b.is_nan() {
                F::nan()
            } else {
                a.max(b)
            }
        }
    }
}

macro_rules! int_element {
    ($t:ty, $dtype:expr, $variant:ident, $from_float:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn to_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }

            fn from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Byte(v) => v as $t,
                    Scalar::Int(v) => v as $t,
                    Scalar::Float(v) => $from_float(v as f64),
                    Scalar::Double(v) => $from_float(v),
                }
            }

            fn unary(self, op: UnaryOp) -> Self {
                match op {
                    UnaryOp::Abs => self.wrapping_abs(),
                    UnaryOp::Neg => self.wrapping_neg(),
                    UnaryOp::Sqr => self.wrapping_mul(self),
                    UnaryOp::Signum => self.signum(),
                    UnaryOp::Floor | UnaryOp::Ceil | UnaryOp::Round | UnaryOp::Rint => self,
                    _ => Self::from_f64(float_unary(self as f64, op)),
                }
            }

            fn binary(self, op: BinaryOp, rhs: Self) -> Self {
                match op {
                    BinaryOp::Add => self.wrapping_add(rhs),
                    BinaryOp::Sub => self.wrapping_sub(rhs),
                    BinaryOp::Mul => self.wrapping_mul(rhs),
                    BinaryOp::Div => {
                        if rhs == 0 {
                            0
                        } else {
                            self.wrapping_div(rhs)
                        }
                    }
                    BinaryOp::Min => self.min(rhs),
                    BinaryOp::Max => self.max(rhs),
                }
            }

            fn natural_cmp(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }

            fn write_le(values: &[Self], out: &mut Vec<u8>) {
                out.reserve(values.len() * std::mem::size_of::<$t>());
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }

            fn read_le(bytes: &[u8]) -> Vec<Self> {
                const N: usize = std::mem::size_of::<$t>();
                bytes
                    .chunks_exact(N)
                    .map(|c| {
                        let mut raw = [0u8; N];
                        raw.copy_from_slice(c);
                        <$t>::from_le_bytes(raw)
                    })
                    .collect()
            }

            fn into_any_storage(storage: Storage<Self>) -> AnyStorage {
                AnyStorage::$variant(storage)
            }

            fn from_any_storage(storage: AnyStorage) -> Option<Storage<Self>> {
                match storage {
                    AnyStorage::$variant(s) => Some(s),
                    _ => None,
                }
            }

            fn into_any_array(array: DArray<Self>) -> AnyArray {
                AnyArray::$variant(array)
            }

            fn from_any_array(array: AnyArray) -> Option<DArray<Self>> {
                match array {
                    AnyArray::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

// f32 -> i32 is exact-range in f64, so both float kinds can share one path.
int_element!(i8, DType::Byte, Byte, |v: f64| (v as i32) as i8);
int_element!(i32, DType::Int, Int, |v: f64| v as i32);

macro_rules! float_element {
    ($t:ty, $dtype:expr, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn to_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }

            fn from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Byte(v) => v as $t,
                    Scalar::Int(v) => v as $t,
                    Scalar::Float(v) => v as $t,
                    Scalar::Double(v) => v as $t,
                }
            }

            fn unary(self, op: UnaryOp) -> Self {
                float_unary(self, op)
            }

            fn binary(self, op: BinaryOp, rhs: Self) -> Self {
                float_binary(self, op, rhs)
            }

            fn natural_cmp(&self, other: &Self) -> Ordering {
                self.total_cmp(other)
            }

            fn is_nan(self) -> bool {
                <$t>::is_nan(self)
            }

            fn write_le(values: &[Self], out: &mut Vec<u8>) {
                out.reserve(values.len() * std::mem::size_of::<$t>());
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }

            fn read_le(bytes: &[u8]) -> Vec<Self> {
                const N: usize = std::mem::size_of::<$t>();
                bytes
                    .chunks_exact(N)
                    .map(|c| {
                        let mut raw = [0u8; N];
                        raw.copy_from_slice(c);
                        <$t>::from_le_bytes(raw)
                    })
                    .collect()
            }

            fn into_any_storage(storage: Storage<Self>) -> AnyStorage {
                AnyStorage::$variant(storage)
            }

            fn from_any_storage(storage: AnyStorage) -> Option<Storage<Self>> {
                match storage {
                    AnyStorage::$variant(s) => Some(s),
                    _ => None,
                }
            }

            fn into_any_array(array: DArray<Self>) -> AnyArray {
                AnyArray::$variant(array)
            }

            fn from_any_array(array: AnyArray) -> Option<DArray<Self>> {
                match array {
                    AnyArray::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

float_element!(f32, DType::Float, Float);
float_element!(f64, DType::Double, Double);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_from_id_case_insensitive() {
        assert_eq!(DType::from_id("Double").unwrap(), DType::Double);
        assert_eq!(DType::from_id("INT").unwrap(), DType::Int);
        assert_eq!(DType::from_id("byte").unwrap(), DType::Byte);
        assert_eq!(DType::from_id("fLoAt").unwrap(), DType::Float);
        assert!(matches!(
            DType::from_id("long"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_byte_count() {
        assert_eq!(DType::Byte.byte_count(), 1);
        assert_eq!(DType::Int.byte_count(), 4);
        assert_eq!(DType::Float.byte_count(), 4);
        assert_eq!(DType::Double.byte_count(), 8);
    }

    #[test]
    fn test_narrowing_casts() {
        // int -> byte keeps the low 8 bits
        assert_eq!(i8::cast(200i32), -56);
        assert_eq!(i8::cast(256i32), 0);
        // double -> byte goes through int
        assert_eq!(i8::cast(300.7f64), 44);
        assert_eq!(i8::cast(-1.9f64), -1);
        // double -> int saturates, NaN -> 0
        assert_eq!(i32::cast(1e20f64), i32::MAX);
        assert_eq!(i32::cast(-1e20f64), i32::MIN);
        assert_eq!(i32::cast(f64::NAN), 0);
        assert_eq!(i8::cast(f32::NAN), 0);
        // double -> float rounds to nearest
        assert_eq!(f32::cast(0.1f64), 0.1f32);
    }

    #[test]
    fn test_widening_exact() {
        assert_eq!(f64::cast(-7i8), -7.0);
        assert_eq!(f64::cast(i32::MAX), 2147483647.0);
        assert_eq!(f64::cast(0.1f32), 0.1f32 as f64);
    }

    #[test]
    fn test_dtype_cast_scalar() {
        assert_eq!(DType::Byte.cast(Scalar::Double(130.0)), Scalar::Byte(-126));
        assert_eq!(DType::Double.cast(Scalar::Int(3)), Scalar::Double(3.0));
    }

    #[test]
    fn test_nan_predicate() {
        assert!(f64::NAN.is_nan());
        assert!(!Element::is_nan(3i32));
        assert!(DType::Float.is_nan(Scalar::Float(f32::NAN)));
        assert!(!DType::Int.is_nan(Scalar::Int(0)));
    }

    #[test]
    fn test_comparators() {
        let mut v = vec![3.0f64, -1.0, 2.0];
        v.sort_by(f64::natural_order());
        assert_eq!(v, vec![-1.0, 2.0, 3.0]);
        v.sort_by(f64::reverse_order());
        assert_eq!(v, vec![3.0, 2.0, -1.0]);

        let mut w = vec![5i8, -3, 0];
        w.sort_by(i8::natural_order());
        assert_eq!(w, vec![-3, 0, 5]);
    }

    #[test]
    fn test_integer_ops_wrap() {
        assert_eq!(127i8.binary(BinaryOp::Add, 1), -128);
        assert_eq!(7i32.binary(BinaryOp::Div, 2), 3);
        assert_eq!(i32::MIN.unary(UnaryOp::Abs), i32::MIN);
    }

    #[rstest]
    #[case(2.5, 3.0, 2.0)]
    #[case(3.5, 4.0, 4.0)]
    #[case(-2.5, -3.0, -2.0)]
    #[case(0.5, 1.0, 0.0)]
    #[case(1.25, 1.0, 1.0)]
    #[case(-7.0, -7.0, -7.0)]
    fn test_round_and_rint(#[case] v: f64, #[case] round: f64, #[case] rint: f64) {
        assert_eq!(v.unary(UnaryOp::Round), round);
        assert_eq!(v.unary(UnaryOp::Rint), rint);
        assert_eq!((v as f32).unary(UnaryOp::Rint), rint as f32);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(0.0f64.unary(UnaryOp::Sigmoid), 0.5);
        assert!((2.0f32.unary(UnaryOp::Sigmoid) - 0.880_797).abs() < 1e-6);
        assert!(UnaryOp::Sigmoid.floating_only());
        assert!(!UnaryOp::Rint.floating_only());
        assert_eq!(5i8.unary(UnaryOp::Rint), 5);
    }

    #[test]
    fn test_float_min_max_propagate_nan() {
        assert!(1.0f64.binary(BinaryOp::Min, f64::NAN).is_nan());
        assert_eq!(1.0f32.binary(BinaryOp::Max, 2.0), 2.0);
    }

    #[test]
    fn test_storage_tags() {
        for dt in DType::ALL {
            assert_eq!(DType::from_storage_tag(dt.storage_tag()).unwrap(), dt);
        }
        assert!(matches!(
            DType::from_storage_tag("LongArrayStorage"),
            Err(Error::UnknownStorageTag(_))
        ));
    }

    #[test]
    fn test_le_bytes() {
        let mut out = Vec::new();
        i32::write_le(&[1, -2], &mut out);
        assert_eq!(out, vec![1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(i32::read_le(&out), vec![1, -2]);
        assert_eq!(f64::read_le(&2.5f64.to_le_bytes()), vec![2.5]);
    }

    #[test]
    fn test_lanes() {
        let simd = SimdConfig::with_vector_bytes(32);
        assert_eq!(DType::Double.lanes(&simd), 4);
        assert_eq!(DType::Float.lanes(&simd), 8);
        assert_eq!(DType::Byte.lanes(&simd), 32);
    }
}
