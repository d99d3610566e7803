use std::fmt;

use crate::dtype::DType;
use crate::element::{Element, Value};

/// A typed scalar handed to fill and scalar-arithmetic instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar {
    dtype: DType,
    value: Value,
}

impl Scalar {
    pub fn new(dtype: DType, value: Value) -> Self {
        Scalar { dtype, value }
    }

    /// A float64 scalar.
    pub fn float(v: f64) -> Self {
        Scalar::new(DType::F64, Value::Float(v))
    }

    /// An int64 scalar.
    pub fn int(v: i64) -> Self {
        Scalar::new(DType::I64, Value::Int(v))
    }

    pub fn boolean(v: bool) -> Self {
        Scalar::new(DType::Bool, Value::Bool(v))
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn value(&self) -> Value {
        self.value
    }

    /// The scalar converted to `T` with the usual numeric cast rules.
    pub fn get<T: Element>(&self) -> T {
        T::from_value(self.value)
    }
}

// Floating overloads widen to float64 and integral ones to int64, the widths
// fill instructions accept.
impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::float(v as f64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::float(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::int(v as i64)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::int(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::boolean(v)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Bool(b) => write!(f, "{}:{}", b, self.dtype),
            Value::Int(v) => write!(f, "{}:{}", v, self.dtype),
            Value::UInt(v) => write!(f, "{}:{}", v, self.dtype),
            Value::Float(v) => write!(f, "{}:{}", v, self.dtype),
            Value::Complex(re, im) => write!(f, "({}+{}i):{}", re, im, self.dtype),
        }
    }
}
