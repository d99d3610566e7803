use std::fmt;

/// Address space a tensor's backing memory lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    Host,
    #[default]
    Accelerator,
}

impl Device {
    pub fn is_host(&self) -> bool {
        matches!(self, Device::Host)
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Host => write!(f, "host"),
            Device::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Direction of a byte copy between address spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyKind {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl CopyKind {
    /// The copy kind that moves bytes from `src` to `dst`.
    pub fn between(src: Device, dst: Device) -> CopyKind {
        match (src, dst) {
            (Device::Host, Device::Host) => CopyKind::HostToHost,
            (Device::Host, Device::Accelerator) => CopyKind::HostToDevice,
            (Device::Accelerator, Device::Host) => CopyKind::DeviceToHost,
            (Device::Accelerator, Device::Accelerator) => CopyKind::DeviceToDevice,
        }
    }

    /// (source, destination) address spaces.
    pub fn endpoints(&self) -> (Device, Device) {
        match self {
            CopyKind::HostToHost => (Device::Host, Device::Host),
            CopyKind::HostToDevice => (Device::Host, Device::Accelerator),
            CopyKind::DeviceToHost => (Device::Accelerator, Device::Host),
            CopyKind::DeviceToDevice => (Device::Accelerator, Device::Accelerator),
        }
    }
}
