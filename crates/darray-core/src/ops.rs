// Elementwise operation tags
//
// Kernels are parameterized by these enums rather than by closures so that a
// single typed loop serves every function, and so that callers can check
// preconditions (such as floating-only functions) before touching storage.

/// Elementwise unary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Abs,
    Neg,
    Sqr,
    Signum,
    Floor,
    Ceil,
    /// Round half away from zero.
    Round,
    /// Round half to even.
    Rint,
    Sqrt,
    Log,
    Log1p,
    Exp,
    Expm1,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    /// Logistic function `1 / (1 + e^-x)`.
    Sigmoid,
}

impl UnaryOp {
    /// Functions that are only defined for floating kinds.
    pub fn floating_only(&self) -> bool {
        !matches!(
            self,
            UnaryOp::Abs
                | UnaryOp::Neg
                | UnaryOp::Sqr
                | UnaryOp::Signum
                | UnaryOp::Floor
                | UnaryOp::Ceil
                | UnaryOp::Round
                | UnaryOp::Rint
        )
    }
}

/// Elementwise binary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}
