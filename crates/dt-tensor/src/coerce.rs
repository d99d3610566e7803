//! Layout Coercion Engine.
//!
//! Operators ask for tensors in a particular memory format and dtype; the
//! functions here pick the cheapest way to get there. A tensor that already
//! conforms is returned as an alias of the input. Otherwise the layout is
//! normalized first through a strided gather, and only then is the dtype
//! changed, because the cast instruction is not required to handle arbitrary
//! strides.

use crate::backend::Instruction;
use crate::context::Context;
use crate::device::CopyKind;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::factory::{make_tensor, make_tensor_like};
use crate::layout::{strides_for_format, MemoryFormat};
use crate::shape::{check_broadcastable, infer_broadcast_shape, Shape};
use crate::tensor::Tensor;

/// Gathers `src` into fresh memory laid out with `stride`.
///
/// When the backend cannot gather `src.dtype()`, the gather runs in
/// [`LayoutConfig::gather_fallback`](crate::config::LayoutConfig) instead and
/// the returned tensor carries that dtype. Callers that need the source dtype
/// cast back themselves.
fn gather(ctx: &mut Context<'_>, src: &Tensor, stride: &[usize]) -> Result<Tensor> {
    let src = if ctx.backend().supports(Instruction::AsStrided, src.dtype()) {
        src.alias()
    } else {
        let fallback = ctx.config().gather_fallback;
        log::debug!(
            "{} gather unsupported by {}, gathering in {}",
            src.dtype(),
            ctx.backend().name(),
            fallback
        );
        cast_tensor_to(ctx, src, fallback)?
    };
    let out = make_tensor(ctx, src.shape().dims(), Some(stride), src.dtype(), src.device())?;
    log::debug!(
        "gather {} {:?} -> {:?} ({})",
        src.shape(),
        src.stride(),
        stride,
        src.dtype()
    );
    ctx.backend().as_strided(ctx.stream(), &out, &src)?;
    Ok(out)
}

/// Strided copy of `src` into fresh row-major memory.
///
/// The result may carry the configured gather fallback dtype; see
/// [`contiguous`] for a variant that always preserves the dtype.
pub fn as_strided(ctx: &mut Context<'_>, src: &Tensor) -> Result<Tensor> {
    let stride = src.shape().strides();
    gather(ctx, src, &stride)
}

/// Returns `src` laid out densely in `format`.
///
/// A conforming `src` comes back as a borrowed alias with no work issued.
/// Otherwise the data is gathered into new memory with the format's strides,
/// so the result always passes `is_contiguous_in(format)`. A format that is
/// undefined for the tensor's rank is a contract violation.
///
/// When the backend cannot gather `src.dtype()`, the values pass through the
/// configured gather fallback dtype and come back in `src.dtype()` with only
/// the fallback's precision. With the default float32 fallback a float64
/// tensor loses everything past float32 precision.
pub fn contiguous(ctx: &mut Context<'_>, src: &Tensor, format: MemoryFormat) -> Result<Tensor> {
    contiguous_as(ctx, src, src.dtype(), format)
}

/// Returns `src` laid out densely in `format` with element type `dtype`.
///
/// The layout is normalized before the dtype changes. A source that already
/// has the right layout is cast with its strides unchanged. A gather that has
/// to go through the fallback dtype is limited to its precision; see
/// [`contiguous`].
pub fn contiguous_as(
    ctx: &mut Context<'_>,
    src: &Tensor,
    dtype: DType,
    format: MemoryFormat,
) -> Result<Tensor> {
    let laid_out = if src.is_contiguous_in(format) {
        src.alias()
    } else {
        let stride = match strides_for_format(src.shape().dims(), format) {
            Some(stride) => stride,
            None => {
                return ctx.escalate(Err(TensorError::ContractViolation(format!(
                    "{} is undefined for a rank {} tensor",
                    format,
                    src.ndim()
                ))))
            }
        };
        gather(ctx, src, &stride)?
    };
    if laid_out.dtype() == dtype {
        return Ok(laid_out);
    }
    cast_tensor_to(ctx, &laid_out, dtype)
}

/// A row-major copy of `src` in fresh memory, in the same dtype.
///
/// Non-contiguous sources are gathered, with the same fallback precision
/// limit as [`contiguous`].
pub fn clone_tensor(ctx: &mut Context<'_>, src: &Tensor) -> Result<Tensor> {
    if !src.is_contiguous() {
        let gathered = as_strided(ctx, src)?;
        if gathered.dtype() == src.dtype() {
            return Ok(gathered);
        }
        return cast_tensor_to(ctx, &gathered, src.dtype());
    }
    let out = make_tensor(ctx, src.shape().dims(), None, src.dtype(), src.device())?;
    ctx.backend().copy(ctx.stream(), &out, src)?;
    Ok(out)
}

/// Converts the elements of `src` into `dst`.
///
/// The shapes must match exactly. Casting a tensor onto itself is a no-op.
pub fn cast_tensor(ctx: &Context<'_>, src: &Tensor, dst: &Tensor) -> Result<()> {
    ctx.contract(src.shape() == dst.shape(), || {
        format!("cannot cast {} into {}", src.shape(), dst.shape())
    })?;
    if src.shares_storage(dst) && src.stride() == dst.stride() && src.dtype() == dst.dtype() {
        return Ok(());
    }
    log::debug!("cast {} {} -> {}", src.shape(), src.dtype(), dst.dtype());
    ctx.backend().cast(ctx.stream(), dst, src)
}

/// A new tensor like `src` holding its elements converted to `dtype`.
pub fn cast_tensor_to(ctx: &mut Context<'_>, src: &Tensor, dtype: DType) -> Result<Tensor> {
    let out = make_tensor_like(ctx, src, Some(dtype))?;
    cast_tensor(ctx, src, &out)?;
    Ok(out)
}

/// Pairwise [`cast_tensor`] over two equally long lists.
pub fn cast_tensors(ctx: &Context<'_>, srcs: &[Tensor], dsts: &[Tensor]) -> Result<()> {
    ctx.contract(srcs.len() == dsts.len(), || {
        format!("{} sources for {} destinations", srcs.len(), dsts.len())
    })?;
    for (src, dst) in srcs.iter().zip(dsts) {
        cast_tensor(ctx, src, dst)?;
    }
    Ok(())
}

/// Points `tensor` at a freshly cast copy of itself.
///
/// The previous memory is retired in the context if `tensor` owned it.
pub fn cast_tensor_in_place(ctx: &mut Context<'_>, tensor: &mut Tensor, dtype: DType) -> Result<()> {
    if tensor.dtype() == dtype {
        return Ok(());
    }
    let cast = cast_tensor_to(ctx, tensor, dtype)?;
    let old = std::mem::replace(tensor, cast);
    ctx.retire(old);
    Ok(())
}

/// Gives `dst` the contents of `src` under `shape`.
///
/// `src` must be contiguous. When `dst` shares memory with `src` only the
/// metadata is rewritten. Otherwise `dst` is replaced by a new allocation
/// filled with a raw byte copy, and its old memory is retired.
pub fn reshape(ctx: &mut Context<'_>, src: &Tensor, dst: &mut Tensor, shape: &[usize]) -> Result<()> {
    ctx.contract(src.is_contiguous(), || {
        format!(
            "cannot reshape non-contiguous tensor {} with stride {:?}",
            src.shape(),
            src.stride()
        )
    })?;
    let shape = Shape::from_slice(shape);
    ctx.contract(shape.numel() == src.numel(), || {
        format!("cannot reshape {} into {}", src.shape(), shape)
    })?;

    if dst.shares_storage(src) {
        let ownership = dst.ownership();
        *dst = Tensor::from_parts(shape, None, src.dtype(), src.device(), src.storage(), ownership)?;
        return Ok(());
    }

    let out = make_tensor(ctx, shape.dims(), None, src.dtype(), dst.device())?;
    let nbytes = src.numel() * src.elem_size();
    let kind = CopyKind::between(src.device(), out.device());
    ctx.backend()
        .memcpy_async(ctx.stream(), &out.storage(), &src.storage(), nbytes, kind)?;
    ctx.synchronize()?;
    let old = std::mem::replace(dst, out);
    ctx.retire(old);
    Ok(())
}

fn check_broadcast_target(ctx: &Context<'_>, input: &Tensor, size: &[usize]) -> Result<()> {
    let dims = input.shape().dims();
    ctx.contract(
        check_broadcastable(dims, size).is_ok() && infer_broadcast_shape(dims, size) == size,
        || format!("cannot broadcast {} to {:?}", input.shape(), size),
    )
}

/// A new tensor holding `input` broadcast to `size`.
pub fn broadcast_to(ctx: &mut Context<'_>, input: &Tensor, size: &[usize]) -> Result<Tensor> {
    check_broadcast_target(ctx, input, size)?;
    let out = make_tensor(ctx, size, None, input.dtype(), input.device())?;
    ctx.backend().broadcast_to(ctx.stream(), &out, input)?;
    Ok(out)
}

/// Broadcasts `input` to `size` into `out`.
///
/// An empty `size` means `out` already has the right shape and only the dtype
/// is converted. If `out` aliases `input` the result is built in a temporary
/// and `out` is pointed at it afterwards.
pub fn broadcast(ctx: &mut Context<'_>, out: &mut Tensor, input: &Tensor, size: &[usize]) -> Result<()> {
    if size.is_empty() {
        return cast_tensor(ctx, input, out);
    }
    check_broadcast_target(ctx, input, size)?;

    if out.shares_storage(input) {
        let mut tmp = broadcast_to(ctx, input, size)?;
        cast_tensor_in_place(ctx, &mut tmp, out.dtype())?;
        let old = std::mem::replace(out, tmp);
        ctx.retire(old);
        return Ok(());
    }

    ctx.contract(out.shape().dims() == size, || {
        format!("broadcast output {} does not have shape {:?}", out.shape(), size)
    })?;
    if out.dtype() == input.dtype() {
        return ctx.backend().broadcast_to(ctx.stream(), out, input);
    }
    let tmp = broadcast_to(ctx, input, size)?;
    cast_tensor(ctx, &tmp, out)
}

/// Folds every leading dimension of `tensor` into one, leaving `[rows, cols]`.
pub fn trans_tensor_to_2d(tensor: &mut Tensor) -> Result<()> {
    let dims = tensor.shape().dims();
    if dims.len() < 2 {
        return Err(TensorError::Other(format!(
            "cannot flatten rank {} tensor to 2d",
            dims.len()
        )));
    }
    let cols = dims[dims.len() - 1];
    let rows: usize = dims[..dims.len() - 1].iter().product();
    *tensor = tensor.view(Shape::new(vec![rows, cols]))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContractAction, LayoutConfig};
    use crate::device::Device;
    use crate::factory::{from_slice, make_device_tensor};
    use crate::sim::SimBackend;
    use crate::transfer::to_vec;
    use approx::assert_relative_eq;

    fn ctx(sim: &SimBackend) -> Context<'_> {
        let config = LayoutConfig::default().with_contract_action(ContractAction::Return);
        Context::with_config(sim, config).unwrap()
    }

    /// [[0, 1, 2], [3, 4, 5]] seen as its [3, 2] transpose.
    fn transposed<T: crate::element::Element>(ctx: &mut Context<'_>, data: &[T]) -> Tensor {
        let base = from_slice(ctx, data, &[6], Device::Accelerator).unwrap();
        Tensor::wrap(base.storage(), vec![3, 2].into(), Some(vec![1, 3]), T::DTYPE).unwrap()
    }

    #[test]
    fn test_contiguous_is_idempotent() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = transposed(&mut ctx, &[0i32, 1, 2, 3, 4, 5]);
        assert!(!src.is_contiguous());

        let once = contiguous(&mut ctx, &src, MemoryFormat::Contiguous).unwrap();
        assert!(once.is_contiguous());
        assert!(!once.shares_storage(&src));
        assert_eq!(to_vec::<i32>(&mut ctx, &once).unwrap(), vec![0, 3, 1, 4, 2, 5]);

        let allocations = sim.stats().allocations;
        let twice = contiguous(&mut ctx, &once, MemoryFormat::Contiguous).unwrap();
        let thrice = contiguous(&mut ctx, &twice, MemoryFormat::Contiguous).unwrap();
        assert!(thrice.shares_storage(&once));
        assert_eq!(thrice.shape(), once.shape());
        assert_eq!(thrice.stride(), once.stride());
        assert_eq!(sim.stats().allocations, allocations);
        assert_eq!(sim.stats().issued(Instruction::AsStrided), 1);
    }

    #[test]
    fn test_contiguous_channels_last() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let src = from_slice(&mut ctx, &data, &[1, 2, 2, 2], Device::Accelerator).unwrap();
        let nhwc = contiguous(&mut ctx, &src, MemoryFormat::ChannelsLast2d).unwrap();
        assert_eq!(nhwc.stride(), &[8, 1, 4, 2]);
        assert!(nhwc.is_contiguous_in(MemoryFormat::ChannelsLast2d));
        assert_eq!(to_vec::<f32>(&mut ctx, &nhwc).unwrap(), data);

        let again = contiguous(&mut ctx, &nhwc, MemoryFormat::ChannelsLast2d).unwrap();
        assert!(again.shares_storage(&nhwc));
    }

    #[test]
    fn test_contiguous_format_rank_mismatch() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = transposed(&mut ctx, &[0i32, 1, 2, 3, 4, 5]);
        let err = contiguous(&mut ctx, &src, MemoryFormat::ChannelsLast2d).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_float64_gather_falls_back() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = transposed(&mut ctx, &[0.5f64, 1.5, 2.5, 3.5, 4.5, 5.5]);
        let out = contiguous(&mut ctx, &src, MemoryFormat::Contiguous).unwrap();
        assert_eq!(out.dtype(), DType::F64);
        assert!(out.is_contiguous());
        let v = to_vec::<f64>(&mut ctx, &out).unwrap();
        assert_relative_eq!(v[1], 3.5);
        assert_relative_eq!(v[4], 2.5);
        let stats = sim.stats();
        assert_eq!(stats.issued(Instruction::AsStrided), 1);
        assert_eq!(stats.issued(Instruction::Cast), 2);

        let gathered = as_strided(&mut ctx, &src).unwrap();
        assert_eq!(gathered.dtype(), DType::F32);
    }

    #[test]
    fn test_float64_gather_fallback_rounds_to_float32() {
        let data = [0.1f64, 0.2, 0.3, 0.4, 0.5, 1.0 / 3.0];
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = transposed(&mut ctx, &data);
        let out = contiguous(&mut ctx, &src, MemoryFormat::Contiguous).unwrap();
        let v = to_vec::<f64>(&mut ctx, &out).unwrap();
        assert_eq!(out.dtype(), DType::F64);
        assert_eq!(v[0], 0.1f32 as f64);
        assert_ne!(v[0], 0.1);
        assert_eq!(v[4], 0.3f32 as f64);

        let cloned = clone_tensor(&mut ctx, &src).unwrap();
        assert_eq!(to_vec::<f64>(&mut ctx, &cloned).unwrap()[5], (1.0f64 / 3.0) as f32 as f64);
    }

    #[test]
    fn test_float64_gather_without_limitation() {
        let sim = SimBackend::builder().build();
        let mut ctx = ctx(&sim);
        let src = transposed(&mut ctx, &[0.1f64, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let out = contiguous(&mut ctx, &src, MemoryFormat::Contiguous).unwrap();
        assert_eq!(out.dtype(), DType::F64);
        assert_eq!(sim.stats().issued(Instruction::Cast), 0);
        assert_eq!(to_vec::<f64>(&mut ctx, &out).unwrap(), vec![0.1, 0.4, 0.2, 0.5, 0.3, 0.6]);
    }

    #[test]
    fn test_contiguous_as_cases() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let dense = from_slice(&mut ctx, &[1.5f32, -2.5], &[2], Device::Accelerator).unwrap();

        // Right layout, right dtype.
        let same = contiguous_as(&mut ctx, &dense, DType::F32, MemoryFormat::Contiguous).unwrap();
        assert!(same.shares_storage(&dense));

        // Right layout, new dtype.
        let cast = contiguous_as(&mut ctx, &dense, DType::I32, MemoryFormat::Contiguous).unwrap();
        assert_eq!(to_vec::<i32>(&mut ctx, &cast).unwrap(), vec![1, -2]);
        assert_eq!(sim.stats().issued(Instruction::AsStrided), 0);

        // Wrong layout, same dtype.
        let strided = transposed(&mut ctx, &[0i16, 1, 2, 3, 4, 5]);
        let gathered = contiguous_as(&mut ctx, &strided, DType::I16, MemoryFormat::Contiguous).unwrap();
        assert_eq!(gathered.dtype(), DType::I16);
        assert_eq!(sim.stats().issued(Instruction::AsStrided), 1);

        // Wrong layout, new dtype: gather first, then cast.
        let both = contiguous_as(&mut ctx, &strided, DType::F64, MemoryFormat::Contiguous).unwrap();
        assert!(both.is_contiguous());
        assert_eq!(both.dtype(), DType::F64);
        assert_eq!(to_vec::<f64>(&mut ctx, &both).unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert_eq!(sim.stats().issued(Instruction::AsStrided), 2);
    }

    #[test]
    fn test_clone_tensor() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let dense = from_slice(&mut ctx, &[1u8, 2, 3], &[3], Device::Accelerator).unwrap();
        let copy = clone_tensor(&mut ctx, &dense).unwrap();
        assert!(!copy.shares_storage(&dense));
        assert_eq!(to_vec::<u8>(&mut ctx, &copy).unwrap(), vec![1, 2, 3]);
        assert_eq!(sim.stats().issued(Instruction::Copy), 1);

        let strided = transposed(&mut ctx, &[0.0f64, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let gathered = clone_tensor(&mut ctx, &strided).unwrap();
        assert_eq!(gathered.dtype(), DType::F64);
        assert!(gathered.is_contiguous());
    }

    #[test]
    fn test_cast_round_trip_truncates() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = from_slice(&mut ctx, &[1.5f32, -2.25], &[2], Device::Accelerator).unwrap();
        let ints = cast_tensor_to(&mut ctx, &src, DType::I32).unwrap();
        let back = cast_tensor_to(&mut ctx, &ints, DType::F32).unwrap();
        assert_eq!(to_vec::<f32>(&mut ctx, &back).unwrap(), vec![1.0, -2.0]);
    }

    #[test]
    fn test_cast_shape_mismatch_is_contract_violation() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let a = make_device_tensor(&mut ctx, &[2, 3], DType::F32).unwrap();
        let b = make_device_tensor(&mut ctx, &[3, 2], DType::I32).unwrap();
        assert!(cast_tensor(&ctx, &a, &b).unwrap_err().is_contract_violation());
        assert_eq!(sim.stats().issued(Instruction::Cast), 0);
    }

    #[test]
    fn test_cast_onto_itself_is_noop() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let a = make_device_tensor(&mut ctx, &[2], DType::F32).unwrap();
        cast_tensor(&ctx, &a, &a.alias()).unwrap();
        assert_eq!(sim.stats().issued(Instruction::Cast), 0);
    }

    #[test]
    fn test_cast_tensors() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let srcs = vec![
            from_slice(&mut ctx, &[1.9f32], &[1], Device::Accelerator).unwrap(),
            from_slice(&mut ctx, &[-7.1f32], &[1], Device::Accelerator).unwrap(),
        ];
        let dsts = vec![
            make_device_tensor(&mut ctx, &[1], DType::I64).unwrap(),
            make_device_tensor(&mut ctx, &[1], DType::I64).unwrap(),
        ];
        cast_tensors(&ctx, &srcs, &dsts).unwrap();
        assert_eq!(to_vec::<i64>(&mut ctx, &dsts[0]).unwrap(), vec![1]);
        assert_eq!(to_vec::<i64>(&mut ctx, &dsts[1]).unwrap(), vec![-7]);
        assert!(cast_tensors(&ctx, &srcs, &dsts[..1]).unwrap_err().is_contract_violation());
    }

    #[test]
    fn test_cast_in_place_retires_owned_memory() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let mut t = from_slice(&mut ctx, &[3.0f32, 4.0], &[2], Device::Accelerator).unwrap();
        let before = t.storage();
        cast_tensor_in_place(&mut ctx, &mut t, DType::I8).unwrap();
        assert_eq!(t.dtype(), DType::I8);
        assert_ne!(t.storage(), before);
        assert!(t.is_owned());
        assert_eq!(ctx.retired_allocations(), 1);

        let live = sim.live_buffers();
        assert_eq!(ctx.reclaim_retired().unwrap(), 1);
        assert_eq!(sim.live_buffers(), live - 1);
        assert_eq!(to_vec::<i8>(&mut ctx, &t).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_cast_in_place_leaves_borrowed_memory() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let owner = make_device_tensor(&mut ctx, &[2], DType::F32).unwrap();
        let mut borrowed = owner.alias();
        cast_tensor_in_place(&mut ctx, &mut borrowed, DType::F16).unwrap();
        assert_eq!(ctx.retired_allocations(), 0);
        assert!(!borrowed.shares_storage(&owner));
    }

    #[test]
    fn test_reshape_aliased_is_metadata_only() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = from_slice(&mut ctx, &[1i32, 2, 3, 4, 5, 6], &[2, 3], Device::Accelerator).unwrap();
        let mut dst = src.alias();
        let allocations = sim.stats().allocations;
        reshape(&mut ctx, &src, &mut dst, &[3, 2]).unwrap();
        assert_eq!(sim.stats().allocations, allocations);
        assert_eq!(dst.storage(), src.storage());
        assert_eq!(dst.shape().dims(), &[3, 2]);
        assert_eq!(dst.stride(), &[2, 1]);
        assert!(!dst.is_owned());
    }

    #[test]
    fn test_reshape_aliased_keeps_output_ownership() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let mut owner = from_slice(&mut ctx, &[1i32, 2, 3, 4], &[2, 2], Device::Accelerator).unwrap();
        let borrowed = owner.alias();
        reshape(&mut ctx, &borrowed, &mut owner, &[4]).unwrap();
        assert!(owner.is_owned());
        assert_eq!(owner.shape().dims(), &[4]);
        assert_eq!(owner.storage(), borrowed.storage());
    }

    #[test]
    fn test_reshape_into_separate_output() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = from_slice(&mut ctx, &[1i32, 2, 3, 4, 5, 6], &[2, 3], Device::Accelerator).unwrap();
        let mut dst = make_device_tensor(&mut ctx, &[1], DType::I32).unwrap();
        reshape(&mut ctx, &src, &mut dst, &[6]).unwrap();
        assert_eq!(dst.numel(), src.numel());
        assert!(!dst.shares_storage(&src));
        assert_eq!(to_vec::<i32>(&mut ctx, &dst).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(ctx.retired_allocations(), 1);
    }

    #[test]
    fn test_reshape_rejects_non_contiguous() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let src = transposed(&mut ctx, &[0i32, 1, 2, 3, 4, 5]);
        let mut dst = src.alias();
        assert!(reshape(&mut ctx, &src, &mut dst, &[6]).unwrap_err().is_contract_violation());
        let dense = from_slice(&mut ctx, &[0i32, 1], &[2], Device::Accelerator).unwrap();
        let mut out = dense.alias();
        assert!(reshape(&mut ctx, &dense, &mut out, &[3]).unwrap_err().is_contract_violation());
    }

    #[test]
    fn test_broadcast_into_output() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let input = from_slice(&mut ctx, &[1.0f32, 2.0, 3.0], &[3], Device::Accelerator).unwrap();
        let mut out = make_device_tensor(&mut ctx, &[2, 3], DType::F32).unwrap();
        broadcast(&mut ctx, &mut out, &input, &[2, 3]).unwrap();
        assert_eq!(to_vec::<f32>(&mut ctx, &out).unwrap(), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

        let mut wide = make_device_tensor(&mut ctx, &[2, 3], DType::I64).unwrap();
        broadcast(&mut ctx, &mut wide, &input, &[2, 3]).unwrap();
        assert_eq!(to_vec::<i64>(&mut ctx, &wide).unwrap(), vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_broadcast_aliased_output_uses_temporary() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let input = from_slice(&mut ctx, &[5i32, 6], &[1, 2], Device::Accelerator).unwrap();
        let mut out = input.alias();
        broadcast(&mut ctx, &mut out, &input, &[3, 2]).unwrap();
        assert!(!out.shares_storage(&input));
        assert_eq!(out.shape().dims(), &[3, 2]);
        assert_eq!(to_vec::<i32>(&mut ctx, &out).unwrap(), vec![5, 6, 5, 6, 5, 6]);
        assert_eq!(to_vec::<i32>(&mut ctx, &input).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_broadcast_empty_size_casts() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let input = from_slice(&mut ctx, &[2.5f32, -1.5], &[2], Device::Accelerator).unwrap();
        let mut out = make_device_tensor(&mut ctx, &[2], DType::I32).unwrap();
        broadcast(&mut ctx, &mut out, &input, &[]).unwrap();
        assert_eq!(to_vec::<i32>(&mut ctx, &out).unwrap(), vec![2, -1]);
        assert_eq!(sim.stats().issued(Instruction::BroadcastTo), 0);
    }

    #[test]
    fn test_broadcast_incompatible_is_contract_violation() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let input = make_device_tensor(&mut ctx, &[4], DType::F32).unwrap();
        let mut out = make_device_tensor(&mut ctx, &[2, 3], DType::F32).unwrap();
        let err = broadcast(&mut ctx, &mut out, &input, &[2, 3]).unwrap_err();
        assert!(err.is_contract_violation());
        // Shrinking is not broadcasting either.
        let big = make_device_tensor(&mut ctx, &[2, 3], DType::F32).unwrap();
        assert!(broadcast_to(&mut ctx, &big, &[3]).unwrap_err().is_contract_violation());
    }

    #[test]
    fn test_trans_tensor_to_2d() {
        let sim = SimBackend::new();
        let mut ctx = ctx(&sim);
        let mut t = make_device_tensor(&mut ctx, &[2, 3, 4], DType::F32).unwrap();
        trans_tensor_to_2d(&mut t).unwrap();
        assert_eq!(t.shape().dims(), &[6, 4]);
        assert_eq!(t.stride(), &[4, 1]);

        let mut flat = make_device_tensor(&mut ctx, &[5], DType::F32).unwrap();
        let err = trans_tensor_to_2d(&mut flat).unwrap_err();
        assert!(!err.is_contract_violation());
    }
}
