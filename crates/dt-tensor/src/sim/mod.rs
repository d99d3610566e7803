//! In-process reference accelerator.
//!
//! Host and device memory are kept in separate address spaces: device bytes
//! can only be reached through copies, and copies issued with
//! `memcpy_async` stay queued on their stream until it is synchronized or a
//! later instruction on the same stream forces them. The per-instruction dtype
//! support table is configuration data supplied through [`SimBuilder`].

mod kernels;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::backend::{AllocCapability, Backend, CopyCapability, Instruction};
use crate::device::{CopyKind, Device};
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::storage::{BufferHandle, StreamId};

#[derive(Debug)]
struct SimBuffer {
    device: Device,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct PendingCopy {
    dst: u64,
    src: u64,
    nbytes: usize,
}

#[derive(Debug, Default)]
struct SimState {
    buffers: HashMap<u64, SimBuffer>,
    streams: HashMap<u64, VecDeque<PendingCopy>>,
    device_bytes: usize,
    stats: SimStats,
}

impl SimState {
    fn buffer(&self, id: u64) -> Result<&SimBuffer> {
        self.buffers.get(&id).ok_or(TensorError::InvalidHandle(id))
    }

    fn buffer_mut(&mut self, id: u64) -> Result<&mut SimBuffer> {
        self.buffers.get_mut(&id).ok_or(TensorError::InvalidHandle(id))
    }

    fn queue(&mut self, stream: StreamId) -> Result<&mut VecDeque<PendingCopy>> {
        self.streams
            .get_mut(&stream.0)
            .ok_or_else(|| TensorError::Other(format!("unknown stream {}", stream.0)))
    }

    /// Executes every copy queued on `stream`, in issue order.
    fn drain(&mut self, stream: StreamId) -> Result<()> {
        let pending: Vec<PendingCopy> = self.queue(stream)?.drain(..).collect();
        for copy in pending {
            let data = self.buffer(copy.src)?.bytes[..copy.nbytes].to_vec();
            self.buffer_mut(copy.dst)?.bytes[..copy.nbytes].copy_from_slice(&data);
        }
        Ok(())
    }
}

/// Counters describing what a [`SimBackend`] has been asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub allocations: usize,
    pub frees: usize,
    pub copies: usize,
    pub synchronizations: usize,
    instructions: HashMap<Instruction, usize>,
}

impl SimStats {
    /// How many times `instruction` has executed.
    pub fn issued(&self, instruction: Instruction) -> usize {
        self.instructions.get(&instruction).copied().unwrap_or(0)
    }

    fn record(&mut self, instruction: Instruction) {
        *self.instructions.entry(instruction).or_insert(0) += 1;
    }
}

/// Configures a [`SimBackend`].
#[derive(Debug, Default)]
pub struct SimBuilder {
    unsupported: HashMap<Instruction, HashSet<DType>>,
    device_capacity: Option<usize>,
}

impl SimBuilder {
    /// Marks `dtype` as rejected by `instruction`.
    pub fn unsupported(mut self, instruction: Instruction, dtype: DType) -> Self {
        self.unsupported.entry(instruction).or_default().insert(dtype);
        self
    }

    /// Caps the total bytes of live device memory.
    pub fn device_capacity(mut self, bytes: usize) -> Self {
        self.device_capacity = Some(bytes);
        self
    }

    pub fn build(self) -> SimBackend {
        SimBackend {
            state: Mutex::new(SimState::default()),
            next_id: AtomicU64::new(1),
            unsupported: self.unsupported,
            device_capacity: self.device_capacity,
        }
    }
}

/// Reference implementation of every capability this crate consumes.
#[derive(Debug)]
pub struct SimBackend {
    state: Mutex<SimState>,
    next_id: AtomicU64,
    unsupported: HashMap<Instruction, HashSet<DType>>,
    device_capacity: Option<usize>,
}

impl SimBackend {
    /// A backend that, like the reference accelerator, cannot gather float64.
    pub fn new() -> Self {
        Self::builder()
            .unsupported(Instruction::AsStrided, DType::F64)
            .build()
    }

    /// A builder with every dtype supported everywhere and no capacity limit.
    pub fn builder() -> SimBuilder {
        SimBuilder::default()
    }

    pub fn stats(&self) -> SimStats {
        self.state
            .lock()
            .map(|s| s.stats.clone())
            .unwrap_or_default()
    }

    /// Number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().map(|s| s.buffers.len()).unwrap_or(0)
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| TensorError::Other("sim backend state poisoned".to_string()))
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocCapability for SimBackend {
    fn allocate(&self, nbytes: usize, device: Device) -> Result<BufferHandle> {
        let mut state = self.state()?;
        if device.is_accelerator() {
            if let Some(cap) = self.device_capacity {
                if state.device_bytes + nbytes > cap {
                    return Err(TensorError::AllocationFailed {
                        nbytes,
                        device: device.to_string(),
                        reason: format!("{} of {} bytes in use", state.device_bytes, cap),
                    });
                }
            }
            state.device_bytes += nbytes;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.buffers.insert(
            id,
            SimBuffer {
                device,
                bytes: vec![0u8; nbytes],
            },
        );
        state.stats.allocations += 1;
        Ok(BufferHandle::new(id, device, nbytes))
    }

    fn free(&self, handle: &BufferHandle) -> Result<()> {
        let mut state = self.state()?;
        let buf = state
            .buffers
            .remove(&handle.id())
            .ok_or(TensorError::InvalidHandle(handle.id()))?;
        if buf.device.is_accelerator() {
            state.device_bytes -= buf.bytes.len();
        }
        state.stats.frees += 1;
        Ok(())
    }

    fn read_host(&self, handle: &BufferHandle) -> Result<Vec<u8>> {
        let state = self.state()?;
        let buf = state.buffer(handle.id())?;
        if !buf.device.is_host() {
            return Err(TensorError::Other(format!(
                "{} is device memory; copy it to the host first",
                handle
            )));
        }
        Ok(buf.bytes.clone())
    }

    fn write_host(&self, handle: &BufferHandle, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut state = self.state()?;
        let buf = state.buffer_mut(handle.id())?;
        if !buf.device.is_host() {
            return Err(TensorError::Other(format!(
                "{} is device memory and cannot be written from the host",
                handle
            )));
        }
        let end = offset + bytes.len();
        if end > buf.bytes.len() {
            return Err(TensorError::Other(format!(
                "write of {} bytes at offset {} overruns {}",
                bytes.len(),
                offset,
                handle
            )));
        }
        buf.bytes[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl CopyCapability for SimBackend {
    fn create_stream(&self) -> Result<StreamId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state()?.streams.insert(id, VecDeque::new());
        Ok(StreamId(id))
    }

    fn destroy_stream(&self, stream: StreamId) -> Result<()> {
        let mut state = self.state()?;
        state.drain(stream)?;
        state.streams.remove(&stream.0);
        Ok(())
    }

    fn memcpy_async(
        &self,
        stream: StreamId,
        dst: &BufferHandle,
        src: &BufferHandle,
        nbytes: usize,
        kind: CopyKind,
    ) -> Result<()> {
        let mut state = self.state()?;
        let (src_dev, dst_dev) = kind.endpoints();
        let src_buf = state.buffer(src.id())?;
        let dst_buf = state.buffer(dst.id())?;
        if src_buf.device != src_dev || dst_buf.device != dst_dev {
            return Err(TensorError::CopyFailed(format!(
                "{:?} copy from {} to {}",
                kind, src, dst
            )));
        }
        if nbytes > src_buf.bytes.len() || nbytes > dst_buf.bytes.len() {
            return Err(TensorError::CopyFailed(format!(
                "{} bytes exceed {} or {}",
                nbytes, src, dst
            )));
        }
        state.queue(stream)?.push_back(PendingCopy {
            dst: dst.id(),
            src: src.id(),
            nbytes,
        });
        state.stats.copies += 1;
        Ok(())
    }

    fn synchronize(&self, stream: StreamId) -> Result<()> {
        let mut state = self.state()?;
        state.drain(stream)?;
        state.stats.synchronizations += 1;
        Ok(())
    }
}

impl Backend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }
}
