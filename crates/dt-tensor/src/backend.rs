use std::fmt::{self, Debug};

use crate::device::{CopyKind, Device};
use crate::dtype::DType;
use crate::error::Result;
use crate::scalar::Scalar;
use crate::storage::{BufferHandle, StreamId};
use crate::tensor::Tensor;

/// Instructions whose dtype support a backend can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Cast,
    Copy,
    Fill,
    MaskedFill,
    DivScalar,
    LtScalar,
    /// Strided gather into fresh dense memory.
    AsStrided,
    BroadcastTo,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Instruction::Cast => "Cast",
            Instruction::Copy => "Copy",
            Instruction::Fill => "Fill",
            Instruction::MaskedFill => "MaskedFill",
            Instruction::DivScalar => "DivScalar",
            Instruction::LtScalar => "LtScalar",
            Instruction::AsStrided => "AsStrided",
            Instruction::BroadcastTo => "BroadcastTo",
        };
        write!(f, "{}", name)
    }
}

/// Raw memory management in both address spaces.
pub trait AllocCapability {
    /// Allocates `nbytes` of zeroed memory on `device`.
    fn allocate(&self, nbytes: usize, device: Device) -> Result<BufferHandle>;

    /// Releases memory obtained from [`allocate`](Self::allocate).
    fn free(&self, handle: &BufferHandle) -> Result<()>;

    /// Reads the whole buffer. Host memory only.
    fn read_host(&self, handle: &BufferHandle) -> Result<Vec<u8>>;

    /// Writes `bytes` at byte `offset`. Host memory only.
    fn write_host(&self, handle: &BufferHandle, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// Byte copies between address spaces, ordered on streams.
pub trait CopyCapability {
    fn create_stream(&self) -> Result<StreamId>;

    fn destroy_stream(&self, stream: StreamId) -> Result<()>;

    /// Enqueues a copy of `nbytes` from the start of `src` to the start of
    /// `dst`. The copy is only guaranteed visible after [`synchronize`].
    ///
    /// [`synchronize`]: Self::synchronize
    fn memcpy_async(
        &self,
        stream: StreamId,
        dst: &BufferHandle,
        src: &BufferHandle,
        nbytes: usize,
        kind: CopyKind,
    ) -> Result<()>;

    /// Blocks until every operation issued on `stream` has completed.
    fn synchronize(&self, stream: StreamId) -> Result<()>;
}

/// Opaque compute verbs. Each reads and writes through tensor descriptors and
/// executes in issue order on `stream`.
pub trait ComputeCapability {
    /// Whether `instruction` accepts operands of `dtype`.
    fn supports(&self, instruction: Instruction, dtype: DType) -> bool;

    /// Elementwise dtype conversion of `src` into `dst` (same shape).
    fn cast(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()>;

    /// Elementwise copy of `src` into `dst` (same shape and dtype).
    fn copy(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()>;

    fn fill(&self, stream: StreamId, dst: &Tensor, value: &Scalar) -> Result<()>;

    /// Writes the single element of `value` wherever `mask` is true.
    fn masked_fill(&self, stream: StreamId, dst: &Tensor, mask: &Tensor, value: &Tensor) -> Result<()>;

    /// In-place `dst /= divisor`.
    fn div_scalar(&self, stream: StreamId, dst: &Tensor, divisor: &Scalar) -> Result<()>;

    /// `out = input < other`, with `out` a bool tensor.
    fn lt_scalar(&self, stream: StreamId, out: &Tensor, input: &Tensor, other: &Scalar) -> Result<()>;

    /// Gathers the elements `src` addresses through its shape and stride into
    /// the layout of `dst`.
    fn as_strided(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()>;

    /// Expands `src` to the shape of `dst`.
    fn broadcast_to(&self, stream: StreamId, dst: &Tensor, src: &Tensor) -> Result<()>;
}

/// The full capability set an accelerator must provide to this layer.
pub trait Backend: AllocCapability + CopyCapability + ComputeCapability + Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "sim").
    fn name(&self) -> &str;
}
