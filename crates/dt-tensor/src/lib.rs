//! `dt-tensor` - device tensor descriptors and layout normalization.
//!
//! This crate provides:
//! - A `Tensor` descriptor (shape, stride, dtype, device, buffer, ownership)
//! - Contiguity analysis for row-major and channel-last memory formats
//! - Broadcast shape inference and minimal backing-buffer sizing
//! - A tensor factory, a layout coercion engine, and host/device transfers
//! - Capability traits for the accelerator (`Backend`) and an in-process
//!   reference implementation (`SimBackend`)

pub mod backend;
pub mod coerce;
pub mod config;
pub mod context;
pub mod device;
pub mod dtype;
pub mod element;
pub mod error;
pub mod factory;
pub mod fill;
pub mod layout;
pub mod native;
pub mod scalar;
pub mod shape;
pub mod sim;
pub mod storage;
pub mod tensor;
pub mod transfer;

// Re-export primary types at the crate root for convenience.
pub use backend::{AllocCapability, Backend, ComputeCapability, CopyCapability, Instruction};
pub use config::{ContractAction, LayoutConfig};
pub use context::Context;
pub use device::{CopyKind, Device};
pub use dtype::{dtype_to_str, DType};
pub use element::{Element, Value};
pub use error::{Result, TensorError};
pub use layout::{is_contiguous, minimal_buffer_extent, MemoryFormat};
pub use native::NativeDataType;
pub use scalar::Scalar;
pub use shape::{infer_broadcast_shape, Shape};
pub use sim::{SimBackend, SimBuilder, SimStats};
pub use storage::{BufferHandle, Ownership, StreamId};
pub use tensor::Tensor;
