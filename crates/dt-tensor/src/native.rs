//! Mapping from [`DType`] to the accelerator's native data type codes.
//!
//! The table is a pure function over a closed enum. There is nothing to
//! initialize and nothing to mutate, so any number of threads may consult it.

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Data type codes understood by the accelerator's instruction descriptors.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeDataType {
    Float = 0,
    Float16 = 1,
    Int8 = 2,
    Int32 = 3,
    Uint8 = 4,
    Int16 = 6,
    Uint16 = 7,
    Uint32 = 8,
    Int64 = 9,
    Uint64 = 10,
    Double = 11,
    Bool = 12,
    Complex64 = 16,
    Complex128 = 17,
}

impl NativeDataType {
    /// Looks up the native code for `dtype`.
    ///
    /// bf16 and tf32 have no native code. Asking for one is a caller bug, so
    /// the error is a contract violation rather than a soft failure.
    pub fn from_dtype(dtype: DType) -> Result<NativeDataType> {
        let native = match dtype {
            DType::F16 => NativeDataType::Float16,
            DType::F32 => NativeDataType::Float,
            DType::F64 => NativeDataType::Double,
            DType::I8 => NativeDataType::Int8,
            DType::U8 => NativeDataType::Uint8,
            DType::I16 => NativeDataType::Int16,
            DType::U16 => NativeDataType::Uint16,
            DType::I32 => NativeDataType::Int32,
            DType::U32 => NativeDataType::Uint32,
            DType::I64 => NativeDataType::Int64,
            DType::U64 => NativeDataType::Uint64,
            DType::Bool => NativeDataType::Bool,
            DType::Complex64 => NativeDataType::Complex64,
            DType::Complex128 => NativeDataType::Complex128,
            DType::BF16 | DType::TF32 => {
                return Err(TensorError::ContractViolation(format!(
                    "accelerator has no native data type for {}",
                    dtype
                )))
            }
        };
        Ok(native)
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }
}
