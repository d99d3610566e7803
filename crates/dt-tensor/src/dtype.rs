use std::fmt;

/// Element types a tensor descriptor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Bool,
    /// IEEE 754 half precision (via the `half` crate).
    F16,
    F32,
    F64,
    /// bfloat16 (via the `half` crate).
    BF16,
    /// TensorFloat-32: stored in 32 bits, 10 mantissa bits significant.
    TF32,
    /// Two f32 components.
    Complex64,
    /// Two f64 components.
    Complex128,
}

impl DType {
    pub const ALL: [DType; 16] = [
        DType::I8,
        DType::U8,
        DType::I16,
        DType::U16,
        DType::I32,
        DType::U32,
        DType::I64,
        DType::U64,
        DType::Bool,
        DType::F16,
        DType::F32,
        DType::F64,
        DType::BF16,
        DType::TF32,
        DType::Complex64,
        DType::Complex128,
    ];

    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::I8 | DType::U8 | DType::Bool => 1,
            DType::I16 | DType::U16 | DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::U32 | DType::F32 | DType::TF32 => 4,
            DType::I64 | DType::U64 | DType::F64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            DType::F16 | DType::F32 | DType::F64 | DType::BF16 | DType::TF32
        )
    }

    /// Integral types, not counting bool.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DType::I8
                | DType::U8
                | DType::I16
                | DType::U16
                | DType::I32
                | DType::U32
                | DType::I64
                | DType::U64
        )
    }

    pub fn is_integral_with_bool(&self) -> bool {
        self.is_integral() || *self == DType::Bool
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DType::Complex64 | DType::Complex128)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DType::I8 | DType::I16 | DType::I32 | DType::I64)
    }

    /// Short lowercase name, used in `Display`.
    pub fn name(&self) -> &'static str {
        match self {
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I16 => "i16",
            DType::U16 => "u16",
            DType::I32 => "i32",
            DType::U32 => "u32",
            DType::I64 => "i64",
            DType::U64 => "u64",
            DType::Bool => "bool",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::BF16 => "bf16",
            DType::TF32 => "tf32",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        }
    }
}

/// Canonical long-form dtype name as it appears in operator diagnostics.
pub fn dtype_to_str(dtype: DType) -> &'static str {
    match dtype {
        DType::I8 => "dtype_int8",
        DType::U8 => "dtype_uint8",
        DType::I16 => "dtype_int16",
        DType::U16 => "dtype_uint16",
        DType::I32 => "dtype_int32",
        DType::U32 => "dtype_uint32",
        DType::I64 => "dtype_int64",
        DType::U64 => "dtype_uint64",
        DType::Bool => "dtype_bool",
        DType::F16 => "dtype_float16",
        DType::F32 => "dtype_float32",
        DType::F64 => "dtype_float64",
        DType::BF16 => "dtype_bfloat16",
        DType::TF32 => "dtype_tfloat32",
        DType::Complex64 => "dtype_complex64",
        DType::Complex128 => "dtype_complex128",
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
