use crate::backend::{ComputeCapability, Instruction};
use crate::dtype::DType;
use crate::element::Value;
use crate::error::{Result, TensorError};
use crate::layout::{expand_strides, for_each_offset};
use crate::native::NativeDataType;
use crate::scalar::Scalar;
use crate::storage::StreamId;
use crate::tensor::Tensor;

use super::{SimBackend, SimState};

fn rejected(instruction: Instruction, reason: String) -> TensorError {
    TensorError::Backend {
        instruction: instruction.to_string(),
        reason,
    }
}

/// Element byte offsets of every logical element of `shape` under `stride`,
/// checked against the size of the backing buffer.
fn byte_offsets(
    instruction: Instruction,
    shape: &[usize],
    stride: &[usize],
    dtype: DType,
    buffer_len: usize,
) -> Result<Vec<usize>> {
    let size = dtype.size_in_bytes();
    let mut offsets = Vec::with_capacity(shape.iter().product());
    for_each_offset(shape, stride, |o| offsets.push(o * size));
    if let Some(&last) = offsets.iter().max() {
        if last + size > buffer_len {
            return Err(rejected(
                instruction,
                format!("layout {:?}/{:?} reaches past a {}-byte buffer", shape, stride, buffer_len),
            ));
        }
    }
    Ok(offsets)
}

/// Reads every logical element of `src` viewed through `stride` over `shape`.
fn gather_values(
    state: &SimState,
    instruction: Instruction,
    src: &Tensor,
    shape: &[usize],
    stride: &[usize],
) -> Result<Vec<Value>> {
    let bytes = &state.buffer(src.storage().id())?.bytes;
    let offsets = byte_offsets(instruction, shape, stride, src.dtype(), bytes.len())?;
    Ok(offsets
        .into_iter()
        .map(|o| Value::read(src.dtype(), &bytes[o..]))
        .collect())
}

/// Writes `values` into the logical elements of `dst`, in row-major order.
fn scatter_values(
    state: &mut SimState,
    instruction: Instruction,
    dst: &Tensor,
    values: &[Value],
) -> Result<()> {
    let bytes = &mut state.buffer_mut(dst.storage().id())?.bytes;
    let offsets = byte_offsets(instruction, dst.shape().dims(), dst.stride(), dst.dtype(), bytes.len())?;
    for (o, v) in offsets.into_iter().zip(values) {
        v.write(dst.dtype(), &mut bytes[o..]);
    }
    Ok(())
}

impl SimBackend {
    fn check_supported(&self, instruction: Instruction, dtypes: &[DType]) -> Result<()> {
        for &dtype in dtypes {
            if !self.supports(instruction, dtype) {
                return Err(rejected(instruction, format!("{} operands are not supported", dtype)));
            }
        }
        Ok(())
    }

    fn check_same_device(&self, instruction: Instruction, tensors: &[&Tensor]) -> Result<()> {
        let device = tensors[0].device();
        if tensors.iter().any(|t| t.device() != device) {
            return Err(rejected(instruction, "operands live in different address spaces".to_string()));
        }
        Ok(())
    }

    fn check_same_shape(&self, instruction: Instruction, dst: &Tensor, src: &Tensor) -> Result<()> {
        if dst.shape() != src.shape() {
            return Err(rejected(
                instruction,
                format!("shape {} does not match {}", src.shape(), dst.shape()),
            ));
        }
        Ok(())
    }

    /// Drains earlier copies on `stream`, then runs `body` against the state.
    fn issue<T>(
        &self,
        stream: StreamId,
        instruction: Instruction,
        body: impl FnOnce(&mut SimState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state()?;
        state.drain(stream)?;
        let out = body(&mut *state)?;
        state.stats.record(instruction);
        log::trace!("sim executed {}", instruction);
        Ok(out)
    }
}

impl ComputeCapability for SimBackend {
    fn supports(&self, instruction: Instruction, dtype: DType) -> bool {
        !self
            .unsupported
            .get(&instruction)
            .is_some_and(|set| set.contains(&dtype))
    }

    fn cast(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()> {
        let op = Instruction::Cast;
        self.check_supported(op, &[src.dtype(), dst.dtype()])?;
        self.check_same_device(op, &[dst, src])?;
        self.check_same_shape(op, dst, src)?;
        self.issue(stream, op, |state| {
            let values = gather_values(state, op, src, src.shape().dims(), src.stride())?;
            scatter_values(state, op, dst, &values)
        })
    }

    fn copy(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()> {
        let op = Instruction::Copy;
        self.check_supported(op, &[src.dtype()])?;
        self.check_same_device(op, &[dst, src])?;
        self.check_same_shape(op, dst, src)?;
        if dst.dtype() != src.dtype() {
            return Err(rejected(op, format!("{} into {}", src.dtype(), dst.dtype())));
        }
        self.issue(stream, op, |state| {
            let values = gather_values(state, op, src, src.shape().dims(), src.stride())?;
            scatter_values(state, op, dst, &values)
        })
    }

    fn fill(&self, stream: StreamId, dst: &Tensor, value: &Scalar) -> Result<()> {
        let op = Instruction::Fill;
        self.check_supported(op, &[dst.dtype()])?;
        self.issue(stream, op, |state| {
            let values = vec![value.value(); dst.numel()];
            scatter_values(state, op, dst, &values)
        })
    }

    fn masked_fill(&self, stream: StreamId, dst: &Tensor, mask: &Tensor, value: &Tensor) -> Result<()> {
        let op = Instruction::MaskedFill;
        self.check_supported(op, &[dst.dtype()])?;
        self.check_same_device(op, &[dst, mask, value])?;
        if value.numel() != 1 {
            return Err(rejected(op, format!("fill value has {} elements", value.numel())));
        }
        let mask_stride = expand_strides(mask.shape().dims(), mask.stride(), dst.shape().dims())?;
        self.issue(stream, op, |state| {
            let fill = gather_values(state, op, value, value.shape().dims(), value.stride())?[0];
            let keep = gather_values(state, op, mask, dst.shape().dims(), &mask_stride)?;
            let current = gather_values(state, op, dst, dst.shape().dims(), dst.stride())?;
            let merged: Vec<Value> = current
                .into_iter()
                .zip(keep)
                .map(|(v, m)| if m.as_bool() { fill } else { v })
                .collect();
            scatter_values(state, op, dst, &merged)
        })
    }

    fn div_scalar(&self, stream: StreamId, dst: &Tensor, divisor: &Scalar) -> Result<()> {
        let op = Instruction::DivScalar;
        self.check_supported(op, &[dst.dtype()])?;
        let floating = dst.dtype().is_floating() || dst.dtype().is_complex();
        let d = divisor.value();
        if !floating && d.as_i64() == 0 {
            return Err(rejected(op, "integer division by zero".to_string()));
        }
        self.issue(stream, op, |state| {
            let values: Vec<Value> = gather_values(state, op, dst, dst.shape().dims(), dst.stride())?
                .into_iter()
                .map(|v| match v {
                    Value::Complex(re, im) => Value::Complex(re / d.as_f64(), im / d.as_f64()),
                    v if floating => Value::Float(v.as_f64() / d.as_f64()),
                    v => Value::Int(v.as_i64() / d.as_i64()),
                })
                .collect();
            scatter_values(state, op, dst, &values)
        })
    }

    fn lt_scalar(&self, stream: StreamId, out: &Tensor, input: &Tensor, other: &Scalar) -> Result<()> {
        let op = Instruction::LtScalar;
        self.check_supported(op, &[input.dtype()])?;
        self.check_same_device(op, &[out, input])?;
        self.check_same_shape(op, out, input)?;
        if out.dtype() != DType::Bool {
            return Err(rejected(op, format!("result must be bool, got {}", out.dtype())));
        }
        let rhs = other.value().as_f64();
        self.issue(stream, op, |state| {
            let values: Vec<Value> = gather_values(state, op, input, input.shape().dims(), input.stride())?
                .into_iter()
                .map(|v| Value::Bool(v.as_f64() < rhs))
                .collect();
            scatter_values(state, op, out, &values)
        })
    }

    fn as_strided(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()> {
        let op = Instruction::AsStrided;
        NativeDataType::from_dtype(src.dtype())?;
        self.check_supported(op, &[src.dtype()])?;
        self.check_same_device(op, &[dst, src])?;
        self.check_same_shape(op, dst, src)?;
        if dst.dtype() != src.dtype() {
            return Err(rejected(op, format!("{} into {}", src.dtype(), dst.dtype())));
        }
        self.issue(stream, op, |state| {
            let values = gather_values(state, op, src, src.shape().dims(), src.stride())?;
            scatter_values(state, op, dst, &values)
        })
    }

    fn broadcast_to(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()> {
        let op = Instruction::BroadcastTo;
        NativeDataType::from_dtype(src.dtype())?;
        self.check_supported(op, &[src.dtype()])?;
        self.check_same_device(op, &[dst, src])?;
        if dst.dtype() != src.dtype() {
            return Err(rejected(op, format!("{} into {}", src.dtype(), dst.dtype())));
        }
        let stride = expand_strides(src.shape().dims(), src.stride(), dst.shape().dims())?;
        self.issue(stream, op, |state| {
            let values = gather_values(state, op, src, dst.shape().dims(), &stride)?;
            scatter_values(state, op, dst, &values)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AllocCapability, CopyCapability};
    use crate::device::Device;
    use crate::element::{encode, Element};
    use crate::shape::Shape;

    fn host_tensor<T: Element>(sim: &SimBackend, data: &[T], shape: Vec<usize>, stride: Option<Vec<usize>>) -> Tensor {
        let bytes = encode(data);
        let h = sim.allocate(bytes.len(), Device::Host).unwrap();
        sim.write_host(&h, 0, &bytes).unwrap();
        Tensor::wrap(h, Shape::new(shape), stride, T::DTYPE).unwrap()
    }

    fn empty_host(sim: &SimBackend, shape: Vec<usize>, dtype: DType) -> Tensor {
        let n: usize = shape.iter().product();
        let h = sim.allocate(n * dtype.size_in_bytes(), Device::Host).unwrap();
        Tensor::wrap(h, Shape::new(shape), None, dtype).unwrap()
    }

    fn read<T: Element>(sim: &SimBackend, t: &Tensor) -> Vec<T> {
        let bytes = sim.read_host(&t.storage()).unwrap();
        bytes
            .chunks_exact(T::DTYPE.size_in_bytes())
            .map(|c| T::from_value(Value::read(T::DTYPE, c)))
            .collect()
    }

    #[test]
    fn test_cast_truncates() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let src = host_tensor(&sim, &[1.5f32, -2.25], vec![2], None);
        let dst = empty_host(&sim, vec![2], DType::I32);
        sim.cast(s, &dst, &src).unwrap();
        assert_eq!(read::<i32>(&sim, &dst), vec![1, -2]);
        assert_eq!(sim.stats().issued(Instruction::Cast), 1);
    }

    #[test]
    fn test_cast_shape_mismatch_is_rejected() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let src = host_tensor(&sim, &[1.0f32, 2.0], vec![2], None);
        let dst = empty_host(&sim, vec![1, 2], DType::F32);
        assert!(sim.cast(s, &dst, &src).is_err());
    }

    #[test]
    fn test_as_strided_gathers_transpose() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        // [[0, 1, 2], [3, 4, 5]] viewed as its transpose.
        let src = host_tensor(&sim, &[0i32, 1, 2, 3, 4, 5], vec![3, 2], Some(vec![1, 3]));
        let dst = empty_host(&sim, vec![3, 2], DType::I32);
        sim.as_strided(s, &dst, &src).unwrap();
        assert_eq!(read::<i32>(&sim, &dst), vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_as_strided_dtype_table() {
        let sim = SimBackend::new();
        assert!(!sim.supports(Instruction::AsStrided, DType::F64));
        assert!(sim.supports(Instruction::Cast, DType::F64));
        let s = sim.create_stream().unwrap();
        let src = host_tensor(&sim, &[1.0f64, 2.0], vec![2], None);
        let dst = empty_host(&sim, vec![2], DType::F64);
        assert!(matches!(sim.as_strided(s, &dst, &src), Err(TensorError::Backend { .. })));

        let permissive = SimBackend::builder().build();
        assert!(permissive.supports(Instruction::AsStrided, DType::F64));
    }

    #[test]
    fn test_as_strided_without_native_code_is_contract_violation() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let src = host_tensor(&sim, &[half::bf16::from_f32(1.0)], vec![1], None);
        let dst = empty_host(&sim, vec![1], DType::BF16);
        let err = sim.as_strided(s, &dst, &src).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_broadcast_to() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let src = host_tensor(&sim, &[1.0f32, 2.0, 3.0], vec![3], None);
        let dst = empty_host(&sim, vec![2, 3], DType::F32);
        sim.broadcast_to(s, &dst, &src).unwrap();
        assert_eq!(read::<f32>(&sim, &dst), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

        let bad = empty_host(&sim, vec![2, 4], DType::F32);
        assert!(sim.broadcast_to(s, &bad, &src).is_err());
    }

    #[test]
    fn test_fill_div_masked_fill_and_lt() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let t = host_tensor(&sim, &[-1.0f32, 2.0, -3.0], vec![3], None);
        let mask = empty_host(&sim, vec![3], DType::Bool);
        sim.lt_scalar(s, &mask, &t, &Scalar::float(0.0)).unwrap();
        assert_eq!(read::<bool>(&sim, &mask), vec![true, false, true]);

        let value = empty_host(&sim, vec![1], DType::F32);
        sim.fill(s, &value, &Scalar::float(0.0)).unwrap();
        sim.div_scalar(s, &value, &Scalar::float(0.0)).unwrap();
        assert!(read::<f32>(&sim, &value)[0].is_nan());

        sim.masked_fill(s, &t, &mask, &value).unwrap();
        let out = read::<f32>(&sim, &t);
        assert!(out[0].is_nan() && out[2].is_nan());
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn test_integer_division_by_zero() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let t = host_tensor(&sim, &[4i32], vec![1], None);
        assert!(sim.div_scalar(s, &t, &Scalar::int(0)).is_err());
        sim.div_scalar(s, &t, &Scalar::int(3)).unwrap();
        assert_eq!(read::<i32>(&sim, &t), vec![1]);
    }

    #[test]
    fn test_instructions_wait_for_queued_copies() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let src = host_tensor(&sim, &[7i64], vec![1], None);
        let dev = sim.allocate(8, Device::Accelerator).unwrap();
        let dev_t = Tensor::wrap(dev, Shape::new(vec![1]), None, DType::I64).unwrap();
        sim.memcpy_async(s, &dev, &src.storage(), 8, crate::device::CopyKind::HostToDevice).unwrap();
        // The cast is ordered after the copy on the same stream.
        let out = sim.allocate(4, Device::Accelerator).unwrap();
        let out_t = Tensor::wrap(out, Shape::new(vec![1]), None, DType::I32).unwrap();
        sim.cast(s, &out_t, &dev_t).unwrap();
        let back = sim.allocate(4, Device::Host).unwrap();
        sim.memcpy_async(s, &back, &out, 4, crate::device::CopyKind::DeviceToHost).unwrap();
        sim.synchronize(s).unwrap();
        assert_eq!(sim.read_host(&back).unwrap(), 7i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_mixed_devices_rejected() {
        let sim = SimBackend::new();
        let s = sim.create_stream().unwrap();
        let src = host_tensor(&sim, &[1.0f32], vec![1], None);
        let dev = sim.allocate(4, Device::Accelerator).unwrap();
        let dst = Tensor::wrap(dev, Shape::new(vec![1]), None, DType::F32).unwrap();
        assert!(sim.copy(s, &dst, &src).is_err());
    }
}
