//! Byte-level codec for every [`DType`], plus the [`Element`] trait that ties
//! Rust scalar types to their dtype.
//!
//! Conversions follow C-style numeric casts: floats truncate toward zero when
//! written to integer types, integers wrap to the target width, anything
//! non-zero becomes `true`, and complex values keep only their real part when
//! written to a real type.

use half::{bf16, f16};

use crate::dtype::DType;

/// A single element value, wide enough to hold any dtype without loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(f64, f64),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Bool(b) => b as u8 as f64,
            Value::Int(v) => v as f64,
            Value::UInt(v) => v as f64,
            Value::Float(v) => v,
            Value::Complex(re, _) => re,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Value::Bool(b) => b as i64,
            Value::Int(v) => v,
            Value::UInt(v) => v as i64,
            Value::Float(v) => v as i64,
            Value::Complex(re, _) => re as i64,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match *self {
            Value::Bool(b) => b as u64,
            Value::Int(v) => v as u64,
            Value::UInt(v) => v,
            // Go through i64 so negative floats wrap like negative ints do.
            Value::Float(v) => v as i64 as u64,
            Value::Complex(re, _) => re as i64 as u64,
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            Value::Bool(b) => b,
            Value::Int(v) => v != 0,
            Value::UInt(v) => v != 0,
            Value::Float(v) => v != 0.0,
            Value::Complex(re, im) => re != 0.0 || im != 0.0,
        }
    }

    pub fn as_complex(&self) -> (f64, f64) {
        match *self {
            Value::Complex(re, im) => (re, im),
            other => (other.as_f64(), 0.0),
        }
    }

    /// Decodes one element of `dtype` from the front of `bytes` (little endian).
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than `dtype.size_in_bytes()`.
    pub fn read(dtype: DType, bytes: &[u8]) -> Value {
        let b = &bytes[..dtype.size_in_bytes()];
        match dtype {
            DType::Bool => Value::Bool(b[0] != 0),
            DType::I8 => Value::Int(b[0] as i8 as i64),
            DType::U8 => Value::UInt(b[0] as u64),
            DType::I16 => Value::Int(i16::from_le_bytes([b[0], b[1]]) as i64),
            DType::U16 => Value::UInt(u16::from_le_bytes([b[0], b[1]]) as u64),
            DType::I32 => Value::Int(i32::from_le_bytes(arr4(b)) as i64),
            DType::U32 => Value::UInt(u32::from_le_bytes(arr4(b)) as u64),
            DType::I64 => Value::Int(i64::from_le_bytes(arr8(b))),
            DType::U64 => Value::UInt(u64::from_le_bytes(arr8(b))),
            DType::F16 => Value::Float(f16::from_le_bytes([b[0], b[1]]).to_f64()),
            DType::BF16 => Value::Float(bf16::from_le_bytes([b[0], b[1]]).to_f64()),
            DType::F32 | DType::TF32 => Value::Float(f32::from_le_bytes(arr4(b)) as f64),
            DType::F64 => Value::Float(f64::from_le_bytes(arr8(b))),
            DType::Complex64 => Value::Complex(
                f32::from_le_bytes(arr4(&b[0..4])) as f64,
                f32::from_le_bytes(arr4(&b[4..8])) as f64,
            ),
            DType::Complex128 => Value::Complex(
                f64::from_le_bytes(arr8(&b[0..8])),
                f64::from_le_bytes(arr8(&b[8..16])),
            ),
        }
    }

    /// Encodes `self` as one element of `dtype` into the front of `out`.
    ///
    /// # Panics
    /// Panics if `out` is shorter than `dtype.size_in_bytes()`.
    pub fn write(&self, dtype: DType, out: &mut [u8]) {
        let n = dtype.size_in_bytes();
        let out = &mut out[..n];
        match dtype {
            DType::Bool => out[0] = self.as_bool() as u8,
            DType::I8 => out[0] = self.as_i64() as i8 as u8,
            DType::U8 => out[0] = self.as_u64() as u8,
            DType::I16 => out.copy_from_slice(&(self.as_i64() as i16).to_le_bytes()),
            DType::U16 => out.copy_from_slice(&(self.as_u64() as u16).to_le_bytes()),
            DType::I32 => out.copy_from_slice(&(self.as_i64() as i32).to_le_bytes()),
            DType::U32 => out.copy_from_slice(&(self.as_u64() as u32).to_le_bytes()),
            DType::I64 => out.copy_from_slice(&self.as_i64().to_le_bytes()),
            DType::U64 => out.copy_from_slice(&self.as_u64().to_le_bytes()),
            DType::F16 => out.copy_from_slice(&f16::from_f64(self.as_f64()).to_le_bytes()),
            DType::BF16 => out.copy_from_slice(&bf16::from_f64(self.as_f64()).to_le_bytes()),
            DType::F32 => out.copy_from_slice(&(self.as_f64() as f32).to_le_bytes()),
            DType::TF32 => {
                // Keep sign, exponent and the top 10 mantissa bits.
                let bits = (self.as_f64() as f32).to_bits() & 0xFFFF_E000;
                out.copy_from_slice(&bits.to_le_bytes())
            }
            DType::F64 => out.copy_from_slice(&self.as_f64().to_le_bytes()),
            DType::Complex64 => {
                let (re, im) = self.as_complex();
                out[0..4].copy_from_slice(&(re as f32).to_le_bytes());
                out[4..8].copy_from_slice(&(im as f32).to_le_bytes());
            }
            DType::Complex128 => {
                let (re, im) = self.as_complex();
                out[0..8].copy_from_slice(&re.to_le_bytes());
                out[8..16].copy_from_slice(&im.to_le_bytes());
            }
        }
    }

    /// Encodes `self` as a freshly allocated element of `dtype`.
    pub fn to_bytes(&self, dtype: DType) -> Vec<u8> {
        let mut out = vec![0u8; dtype.size_in_bytes()];
        self.write(dtype, &mut out);
        out
    }
}

fn arr4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

fn arr8(b: &[u8]) -> [u8; 8] {
    [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

/// Rust types that can be read from or written to tensor memory directly.
pub trait Element: Copy + std::fmt::Debug + 'static {
    const DTYPE: DType;

    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Self;
}

macro_rules! element {
    ($rt:ty, $dtype:expr, $variant:ident, $conv:ident) => {
        impl Element for $rt {
            const DTYPE: DType = $dtype;

            fn into_value(self) -> Value {
                Value::$variant(self as _)
            }

            fn from_value(value: Value) -> Self {
                value.$conv() as $rt
            }
        }
    };
}

element!(i8, DType::I8, Int, as_i64);
element!(i16, DType::I16, Int, as_i64);
element!(i32, DType::I32, Int, as_i64);
element!(i64, DType::I64, Int, as_i64);
element!(u8, DType::U8, UInt, as_u64);
element!(u16, DType::U16, UInt, as_u64);
element!(u32, DType::U32, UInt, as_u64);
element!(u64, DType::U64, UInt, as_u64);
element!(f32, DType::F32, Float, as_f64);
element!(f64, DType::F64, Float, as_f64);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Self {
        value.as_bool()
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    fn into_value(self) -> Value {
        Value::Float(self.to_f64())
    }

    fn from_value(value: Value) -> Self {
        f16::from_f64(value.as_f64())
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::BF16;

    fn into_value(self) -> Value {
        Value::Float(self.to_f64())
    }

    fn from_value(value: Value) -> Self {
        bf16::from_f64(value.as_f64())
    }
}

/// Encodes a slice of elements into little-endian bytes of `T::DTYPE`.
pub fn encode<T: Element>(data: &[T]) -> Vec<u8> {
    let size = T::DTYPE.size_in_bytes();
    let mut out = vec![0u8; data.len() * size];
    for (chunk, v) in out.chunks_exact_mut(size).zip(data) {
        v.into_value().write(T::DTYPE, chunk);
    }
    out
}
