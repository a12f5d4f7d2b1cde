//! Resolves Windows storage paths to their physical disk, adapter and
//! partition table.
//!
//! A path may be a drive letter, a volume GUID path, a physical drive path,
//! a device interface path or a bare disk ordinal. Everything is read fresh
//! from the device through control requests; nothing is cached.

mod descriptor;
mod device;
mod error;
mod extents;
mod ioctl;
mod number;
mod partition;
mod path;
mod resolver;
pub mod types;
#[cfg(windows)]
mod win32;

#[cfg(test)]
mod testing;

pub use device::{Access, DeviceOpener};
pub use error::{Error, Result};
pub use ioctl::{DeviceIo, DEFAULT_MAX_BUFFER_DOUBLINGS};
pub use partition::{gpt_partition_type, MAX_PARTITION_COUNT};
pub use path::{physical_drive_path, ClassifiedPath, PathKind};
pub use resolver::{Lookup, ResolverConfig, StorageResolver, Target};
#[cfg(windows)]
pub use win32::{is_elevated, Win32Device, Win32Opener};

/// Control codes and status codes used on the wire, for [`DeviceIo`]
/// implementations.
pub mod codes {
    pub use crate::ioctl::{
        ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_INSUFFICIENT_BUFFER,
        ERROR_INVALID_FUNCTION, ERROR_MORE_DATA, ERROR_NOT_READY, ERROR_NOT_SUPPORTED,
        IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, IOCTL_DISK_GET_DRIVE_LAYOUT_EX,
        IOCTL_DISK_GET_LENGTH_INFO, IOCTL_STORAGE_GET_DEVICE_NUMBER,
        IOCTL_STORAGE_QUERY_PROPERTY, IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS,
    };
}

#[cfg(windows)]
fn resolver() -> StorageResolver<Win32Opener> {
    StorageResolver::new(Win32Opener)
}

/// Device descriptor of the disk behind `target`. `elevated` defaults to
/// the elevation of the current process.
#[cfg(windows)]
pub fn get_storage_device_info(
    target: impl Into<Target>,
    elevated: Option<bool>,
) -> Result<Option<types::StorageDeviceInfo>> {
    resolver().device_info(target, elevated)
}

#[cfg(windows)]
pub fn get_storage_adapter_info(
    target: impl Into<Target>,
) -> Result<Option<types::StorageAdapterInfo>> {
    resolver().adapter_info(target)
}

#[cfg(windows)]
pub fn get_storage_partition_info(
    target: impl Into<Target>,
    elevated: Option<bool>,
) -> Result<Option<types::StoragePartitionInfo>> {
    resolver().partition_info(target, elevated)
}

/// Adapter, device and partition data together, or `None` when the target
/// cannot be resolved consistently.
#[cfg(windows)]
pub fn get_storage_info(
    target: impl Into<Target>,
    elevated: Option<bool>,
) -> Result<Option<types::StorageInfo>> {
    Ok(resolver().resolve(target, elevated)?.resolved())
}

/// List all physical disks with their adapter, device and partition data.
#[cfg(windows)]
pub fn list_disks() -> Result<Vec<types::StorageInfo>> {
    resolver().list_disks(None)
}
