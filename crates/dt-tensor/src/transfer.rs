//! Cross-Space Mover: migrates tensor storage between host and device.
//!
//! Every copy issued here is followed by a stream synchronization before the
//! function returns, so callers never observe a copy in flight.

use crate::context::Context;
use crate::device::{CopyKind, Device};
use crate::element::{Element, Value};
use crate::error::{Result, TensorError};
use crate::factory::make_tensor;
use crate::layout::for_each_offset;
use crate::tensor::Tensor;

/// Copies the whole backing buffer of `src` into a same-layout tensor on
/// `device`. Returns an alias of `src` when it already lives there.
fn migrate(ctx: &mut Context<'_>, src: &Tensor, device: Device) -> Result<Tensor> {
    if src.device() == device {
        return Ok(src.alias());
    }
    let dst = make_tensor(ctx, src.shape().dims(), Some(src.stride()), src.dtype(), device)?;
    let nbytes = src.base_buffer_size();
    let kind = CopyKind::between(src.device(), device);
    log::debug!("{:?} copy of {} bytes for a {} {} tensor", kind, nbytes, src.shape(), src.dtype());
    ctx.backend()
        .memcpy_async(ctx.stream(), &dst.storage(), &src.storage(), nbytes, kind)?;
    ctx.synchronize()?;
    Ok(dst)
}

/// Moves a host tensor to the accelerator, keeping shape, stride and dtype.
/// Device tensors are returned as an alias without issuing any copy.
pub fn host_to_device(ctx: &mut Context<'_>, src: &Tensor) -> Result<Tensor> {
    migrate(ctx, src, Device::Accelerator)
}

/// Moves a device tensor to the host, keeping shape, stride and dtype.
/// Host tensors are returned as an alias without issuing any copy.
pub fn device_to_host(ctx: &mut Context<'_>, src: &Tensor) -> Result<Tensor> {
    migrate(ctx, src, Device::Host)
}

/// Reads the logical elements of `src` in row-major order, converted to `T`.
pub fn to_vec<T: Element>(ctx: &mut Context<'_>, src: &Tensor) -> Result<Vec<T>> {
    let host = device_to_host(ctx, src)?;
    let bytes = ctx.backend().read_host(&host.storage())?;
    let size = host.elem_size();
    let mut offsets = Vec::with_capacity(host.numel());
    for_each_offset(host.shape().dims(), host.stride(), |o| offsets.push(o * size));
    if let Some(&last) = offsets.iter().max() {
        if last + size > bytes.len() {
            return Err(TensorError::Other(format!(
                "layout {}/{:?} reaches past {}",
                host.shape(),
                host.stride(),
                host.storage()
            )));
        }
    }
    Ok(offsets
        .into_iter()
        .map(|o| T::from_value(Value::read(host.dtype(), &bytes[o..])))
        .collect())
}
