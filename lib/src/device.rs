use crate::error::Result;
use crate::ioctl::DeviceIo;

/// Access rights requested when opening a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Generic read. Only requested from elevated callers.
    Read,
    /// No data access, enough for metadata queries. Some device classes
    /// refuse anything broader from a non-elevated caller.
    Any,
}

impl Access {
    pub fn for_caller(elevated: bool) -> Self {
        if elevated {
            Access::Read
        } else {
            Access::Any
        }
    }
}

/// Opens device nodes and answers the questions about the calling process
/// that the resolver needs.
///
/// The returned device owns its OS handle and releases it on drop, so every
/// exit path of a resolution closes what it opened.
pub trait DeviceOpener {
    type Device: DeviceIo;

    fn open(&self, local_device_path: &str, access: Access) -> Result<Self::Device>;

    fn is_elevated(&self) -> bool;

    /// Bus-reported description of the device behind `local_device_path`,
    /// when the platform layer can look one up.
    fn bus_reported_description(&self, _local_device_path: &str) -> Option<String> {
        None
    }
}

impl<T: DeviceOpener + ?Sized> DeviceOpener for &T {
    type Device = T::Device;

    fn open(&self, local_device_path: &str, access: Access) -> Result<Self::Device> {
        (**self).open(local_device_path, access)
    }

    fn is_elevated(&self) -> bool {
        (**self).is_elevated()
    }

    fn bus_reported_description(&self, local_device_path: &str) -> Option<String> {
        (**self).bus_reported_description(local_device_path)
    }
}
