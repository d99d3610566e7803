use std::fmt;

use crate::device::Device;

/// Opaque handle to a block of backing memory handed out by an
/// [`AllocCapability`](crate::backend::AllocCapability).
///
/// Two handles are the same memory exactly when their ids match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    id: u64,
    device: Device,
    nbytes: usize,
}

impl BufferHandle {
    pub fn new(id: u64, device: Device, nbytes: usize) -> Self {
        BufferHandle { id, device, nbytes }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address space the memory lives in.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Size of the allocation in bytes.
    pub fn nbytes(&self) -> usize {
        self.nbytes
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}@{}({}B)", self.id, self.device, self.nbytes)
    }
}

/// Who is responsible for a descriptor's backing memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Allocated by this layer; reclaimed by the execution context.
    Owned,
    /// Supplied by the caller or aliased from another descriptor.
    Borrowed,
}

/// Ordered instruction stream of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_accessors() {
        let h = BufferHandle::new(7, Device::Host, 24);
        assert_eq!(h.id(), 7);
        assert_eq!(h.device(), Device::Host);
        assert_eq!(h.nbytes(), 24);
        assert_eq!(h.to_string(), "buf#7@host(24B)");
    }

    #[test]
    fn test_identity_is_by_value() {
        let a = BufferHandle::new(1, Device::Accelerator, 8);
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, BufferHandle::new(2, Device::Accelerator, 8));
    }
}
