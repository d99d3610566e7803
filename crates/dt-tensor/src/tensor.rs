use crate::device::Device;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::layout::{self, MemoryFormat};
use crate::shape::Shape;
use crate::storage::{BufferHandle, Ownership};

/// A tensor descriptor: logical shape and stride over a block of backing memory.
///
/// Descriptors carry no data of their own. They are created per operation
/// and stay valid for the lifetime of the execution context that produced
/// their memory. Every descriptor is tagged with who owns the memory it
/// points at; see [`Ownership`].
///
/// `clone()` copies the tag along with everything else, so a clone of an
/// owned descriptor is owned too. Use [`alias`](Tensor::alias) to hand out a
/// descriptor that does not own its memory. The context frees a buffer at
/// most once, however many owned copies of it are retired.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    stride: Vec<usize>,
    dtype: DType,
    device: Device,
    storage: BufferHandle,
    ownership: Ownership,
}

impl Tensor {
    /// Builds a descriptor over existing memory. A missing `stride` means
    /// row-major contiguous.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `stride` and `shape` differ in length, and
    /// `Other` if the buffer is too small for the layout or lives in a
    /// different address space than `device`.
    pub fn from_parts(
        shape: Shape,
        stride: Option<Vec<usize>>,
        dtype: DType,
        device: Device,
        storage: BufferHandle,
        ownership: Ownership,
    ) -> Result<Tensor> {
        let stride = match stride {
            Some(s) => {
                if s.len() != shape.ndim() {
                    return Err(TensorError::ShapeMismatch {
                        expected: shape.dims().to_vec(),
                        got: s,
                    });
                }
                s
            }
            None => shape.strides(),
        };
        if storage.device() != device {
            return Err(TensorError::Other(format!(
                "{} cannot back a {} tensor",
                storage, device
            )));
        }
        let needed = layout::minimal_buffer_extent(shape.dims(), &stride, dtype.size_in_bytes());
        if storage.nbytes() < needed {
            return Err(TensorError::Other(format!(
                "{} is smaller than the {} bytes a {} {} tensor needs",
                storage, needed, shape, dtype
            )));
        }
        Ok(Tensor {
            shape,
            stride,
            dtype,
            device,
            storage,
            ownership,
        })
    }

    /// Wraps caller-owned memory. The descriptor never claims ownership.
    pub fn wrap(
        storage: BufferHandle,
        shape: Shape,
        stride: Option<Vec<usize>>,
        dtype: DType,
    ) -> Result<Tensor> {
        Tensor::from_parts(shape, stride, dtype, storage.device(), storage, Ownership::Borrowed)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn stride(&self) -> &[usize] {
        &self.stride
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn storage(&self) -> BufferHandle {
        self.storage
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn elem_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }

    pub fn is_contiguous(&self) -> bool {
        self.is_contiguous_in(MemoryFormat::Contiguous)
    }

    pub fn is_contiguous_in(&self, format: MemoryFormat) -> bool {
        layout::is_contiguous(self.shape.dims(), &self.stride, format)
    }

    /// Bytes of backing memory this layout spans.
    pub fn base_buffer_size(&self) -> usize {
        layout::minimal_buffer_extent(self.shape.dims(), &self.stride, self.elem_size())
    }

    pub fn base_shape(&self) -> Vec<usize> {
        layout::base_shape(self.shape.dims(), &self.stride)
    }

    /// Whether both descriptors point at the same backing memory.
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        self.storage == other.storage
    }

    /// A borrowed descriptor over the same memory and layout.
    pub fn alias(&self) -> Tensor {
        Tensor {
            ownership: Ownership::Borrowed,
            ..self.clone()
        }
    }

    /// Reinterprets a contiguous tensor with a new shape. Metadata only.
    ///
    /// The element count must stay the same. Ownership carries over unchanged
    /// because the result replaces `self` at call sites that reshape in place.
    pub fn view(&self, new_shape: Shape) -> Result<Tensor> {
        if !self.is_contiguous() {
            return Err(TensorError::Other(format!(
                "cannot view non-contiguous tensor of shape {} with stride {:?}",
                self.shape, self.stride
            )));
        }
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        let stride = new_shape.strides();
        Ok(Tensor {
            shape: new_shape,
            stride,
            ..self.clone()
        })
    }
}
