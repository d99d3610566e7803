//! Tensor Factory: fresh descriptors from explicit layouts, from other
//! tensors, from scalars and from size vectors.
//!
//! Every allocation goes through the context arena and is tagged
//! [`Ownership::Owned`].

use crate::context::Context;
use crate::device::{CopyKind, Device};
use crate::dtype::DType;
use crate::element::{encode, Element, Value};
use crate::error::{Result, TensorError};
use crate::fill::fill_tensor;
use crate::layout::minimal_buffer_extent;
use crate::scalar::Scalar;
use crate::shape::{contiguous_strides, Shape};
use crate::storage::Ownership;
use crate::tensor::Tensor;
use crate::transfer::host_to_device;

/// Allocates a tensor with an explicit layout. A missing `stride` means
/// row-major contiguous.
///
/// Allocation failure is returned to the caller. A descriptor that cannot be
/// built over the memory the allocator handed back is a contract violation:
/// the allocator has no degraded mode to fall back to.
pub fn make_tensor(
    ctx: &mut Context<'_>,
    shape: &[usize],
    stride: Option<&[usize]>,
    dtype: DType,
    device: Device,
) -> Result<Tensor> {
    if let Some(stride) = stride {
        ctx.contract(stride.len() == shape.len(), || {
            format!("stride {:?} does not fit shape {:?}", stride, shape)
        })?;
    }
    let stride = stride.map_or_else(|| contiguous_strides(shape), |s| s.to_vec());
    let nbytes = minimal_buffer_extent(shape, &stride, dtype.size_in_bytes());
    let handle = ctx.allocate(nbytes, device)?;
    let tensor = Tensor::from_parts(
        Shape::from_slice(shape),
        Some(stride),
        dtype,
        device,
        handle,
        Ownership::Owned,
    )
    .map_err(|e| TensorError::ContractViolation(format!("generated tensor is invalid: {}", e)));
    ctx.escalate(tensor)
}

/// Row-major tensor on the accelerator.
pub fn make_device_tensor(ctx: &mut Context<'_>, shape: &[usize], dtype: DType) -> Result<Tensor> {
    make_tensor(ctx, shape, None, dtype, Device::Accelerator)
}

/// Same shape, stride and device as `src`; `dtype` overrides the element type.
pub fn make_tensor_like(ctx: &mut Context<'_>, src: &Tensor, dtype: Option<DType>) -> Result<Tensor> {
    let dtype = dtype.unwrap_or(src.dtype());
    make_tensor(ctx, src.shape().dims(), Some(src.stride()), dtype, src.device())
}

/// Single-element tensor holding `scalar` in the scalar's own dtype.
pub fn make_tensor_from_scalar(ctx: &mut Context<'_>, scalar: &Scalar, device: Device) -> Result<Tensor> {
    make_tensor_from_scalar_as(ctx, scalar, scalar.dtype(), device)
}

/// Single-element tensor holding `scalar` converted to `dtype`.
///
/// On the host the value is written directly. On the accelerator it is
/// staged at full width (float64 for floating targets, int64 for integral and
/// bool targets), copied to the device, and then cast down, since the device
/// cannot take narrowing scalar writes from the host.
pub fn make_tensor_from_scalar_as(
    ctx: &mut Context<'_>,
    scalar: &Scalar,
    dtype: DType,
    device: Device,
) -> Result<Tensor> {
    match device {
        Device::Host => {
            ctx.contract(!dtype.is_complex() && dtype != DType::TF32, || {
                format!("dtype {} not supported on host", dtype)
            })?;
            let out = make_tensor(ctx, &[1], None, dtype, Device::Host)?;
            ctx.backend()
                .write_host(&out.storage(), 0, &scalar.value().to_bytes(dtype))?;
            Ok(out)
        }
        Device::Accelerator => {
            let staging = if dtype.is_floating() {
                DType::F64
            } else if dtype.is_integral_with_bool() {
                DType::I64
            } else {
                return ctx.escalate(Err(TensorError::ContractViolation(format!(
                    "dtype {} not supported on device",
                    dtype
                ))));
            };
            let host = make_tensor(ctx, &[1], None, staging, Device::Host)?;
            ctx.backend()
                .write_host(&host.storage(), 0, &scalar.value().to_bytes(staging))?;
            let staged = make_tensor(ctx, &[1], None, staging, Device::Accelerator)?;
            ctx.backend().memcpy_async(
                ctx.stream(),
                &staged.storage(),
                &host.storage(),
                staging.size_in_bytes(),
                CopyKind::HostToDevice,
            )?;
            ctx.synchronize()?;
            let out = make_tensor(ctx, &[1], None, dtype, Device::Accelerator)?;
            ctx.backend().cast(ctx.stream(), &out, &staged)?;
            log::debug!("scalar {} materialized on device as {}", scalar, dtype);
            Ok(out)
        }
    }
}

/// Host rank-1 tensor holding the entries of `size`.
///
/// int64, int32, int16 and bool are accepted; anything else is a contract
/// violation.
pub fn make_tensor_from_size(ctx: &mut Context<'_>, size: &[i64], dtype: DType) -> Result<Tensor> {
    ctx.contract(
        matches!(dtype, DType::I64 | DType::I32 | DType::I16 | DType::Bool),
        || format!("size vectors cannot be stored as {}", dtype),
    )?;
    let out = make_tensor(ctx, &[size.len()], None, dtype, Device::Host)?;
    if !size.is_empty() {
        let elem = dtype.size_in_bytes();
        let mut bytes = vec![0u8; size.len() * elem];
        for (chunk, &v) in bytes.chunks_exact_mut(elem).zip(size) {
            Value::Int(v).write(dtype, chunk);
        }
        ctx.backend().write_host(&out.storage(), 0, &bytes)?;
    }
    Ok(out)
}

/// Row-major tensor initialized from host data.
pub fn from_slice<T: Element>(
    ctx: &mut Context<'_>,
    data: &[T],
    shape: &[usize],
    device: Device,
) -> Result<Tensor> {
    let numel: usize = shape.iter().product();
    ctx.contract(data.len() == numel, || {
        format!("{} values cannot fill shape {:?}", data.len(), shape)
    })?;
    let host = make_tensor(ctx, shape, None, T::DTYPE, Device::Host)?;
    if !data.is_empty() {
        ctx.backend().write_host(&host.storage(), 0, &encode(data))?;
    }
    match device {
        Device::Host => Ok(host),
        Device::Accelerator => host_to_device(ctx, &host),
    }
}

/// Like `src`, filled with ones.
pub fn make_ones_like(ctx: &mut Context<'_>, src: &Tensor, dtype: Option<DType>) -> Result<Tensor> {
    let out = make_tensor_like(ctx, src, dtype)?;
    fill_tensor(ctx, &out, 1.0f32)?;
    Ok(out)
}

/// Reuses an optional output buffer, or allocates a row-major device tensor
/// (filled with `fill` when given).
pub fn create_tensor_if_absent(
    ctx: &mut Context<'_>,
    existing: Option<&Tensor>,
    shape: &[usize],
    dtype: DType,
    fill: Option<f64>,
) -> Result<Tensor> {
    if let Some(t) = existing {
        return Ok(t.alias());
    }
    let out = make_device_tensor(ctx, shape, dtype)?;
    if let Some(value) = fill {
        fill_tensor(ctx, &out, value)?;
    }
    Ok(out)
}
