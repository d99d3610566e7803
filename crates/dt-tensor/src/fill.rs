//! Constant and NaN fills.

use crate::coerce::{cast_tensor, cast_tensor_to};
use crate::context::Context;
use crate::device::Device;
use crate::dtype::DType;
use crate::error::Result;
use crate::factory::{make_ones_like, make_tensor_from_scalar_as, make_tensor_like};
use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Sets every element of `tensor` to `value`, converted to the tensor's dtype.
pub fn fill_tensor(ctx: &Context<'_>, tensor: &Tensor, value: impl Into<Scalar>) -> Result<()> {
    let value = value.into();
    ctx.backend().fill(ctx.stream(), tensor, &value)
}

/// Single float32 NaN produced on `device` as 0.0 / 0.0.
fn make_nan(ctx: &mut Context<'_>, device: Device) -> Result<Tensor> {
    let nan = make_tensor_from_scalar_as(ctx, &Scalar::float(0.0), DType::F32, device)?;
    ctx.backend().div_scalar(ctx.stream(), &nan, &Scalar::float(0.0))?;
    Ok(nan)
}

/// Overwrites every element of `tensor` with NaN.
pub fn fill_nan(ctx: &mut Context<'_>, tensor: &Tensor) -> Result<()> {
    let nan = make_nan(ctx, tensor.device())?;
    let mask = make_ones_like(ctx, tensor, Some(DType::Bool))?;
    ctx.backend().masked_fill(ctx.stream(), tensor, &mask, &nan)
}

/// Writes NaN into `out` wherever `input` is negative.
///
/// float16 inputs are compared in float32. float16 outputs are filled through
/// a float64 temporary and cast back, since a half-precision NaN only comes
/// out of a cast on the reference hardware.
pub fn negative_input_fill_nan(ctx: &mut Context<'_>, out: &Tensor, input: &Tensor) -> Result<()> {
    let input = if input.dtype() == DType::F16 {
        cast_tensor_to(ctx, input, DType::F32)?
    } else {
        input.alias()
    };
    let mask = make_tensor_like(ctx, &input, Some(DType::Bool))?;
    ctx.backend()
        .lt_scalar(ctx.stream(), &mask, &input, &Scalar::float(0.0))?;
    let nan = make_nan(ctx, out.device())?;

    if out.dtype() == DType::F16 {
        let wide = cast_tensor_to(ctx, out, DType::F64)?;
        ctx.backend().masked_fill(ctx.stream(), &wide, &mask, &nan)?;
        cast_tensor(ctx, &wide, out)
    } else {
        ctx.backend().masked_fill(ctx.stream(), out, &mask, &nan)
    }
}
