use log::{debug, warn};

use crate::device::{Access, DeviceOpener};
use crate::error::{Error, Result};
use crate::extents;
use crate::ioctl::{
    query, wire, DeviceIo, Reply, Request, ERROR_FILE_NOT_FOUND, ERROR_INVALID_FUNCTION,
    IOCTL_STORAGE_GET_DEVICE_NUMBER,
};
use crate::path::{physical_drive_path, ClassifiedPath, PathKind};
use crate::resolver::Lookup;
use crate::types::{DeviceIdentity, DeviceType};

const STORAGE_DEVICE_NUMBER_SIZE: usize = 12;

/// A target whose device number is known, with the open device it was
/// read from. `local_device_path` differs from the classified path when a
/// dynamic volume was redirected to its physical disk; the volume itself
/// then stays open in `named`.
pub(crate) struct Located<D> {
    pub identity: DeviceIdentity,
    pub local_device_path: String,
    pub device: D,
    pub named_path: String,
    pub named: Option<D>,
}

impl<D> Located<D> {
    /// The device the caller named, with its path.
    pub(crate) fn named_device(&self) -> (&D, &str) {
        match &self.named {
            Some(volume) => (volume, &self.named_path),
            None => (&self.device, &self.local_device_path),
        }
    }
}

pub(crate) fn decode(buffer: &[u8], path: &str) -> Result<DeviceIdentity> {
    let field = |offset| {
        wire::u32_at(buffer, offset).ok_or_else(|| Error::Truncated {
            structure: "STORAGE_DEVICE_NUMBER",
            needed: STORAGE_DEVICE_NUMBER_SIZE,
            got: buffer.len(),
            path: path.to_owned(),
        })
    };
    Ok(DeviceIdentity {
        device_type: DeviceType::from_raw(field(0)?),
        device_number: field(4)?,
        // Non-partitionable devices report 0xFFFFFFFF.
        partition_number: field(8)? as i32,
    })
}

/// Opens `path` and reads its device number.
///
/// Volumes on dynamic disks reject the query with ERROR_INVALID_FUNCTION;
/// those are redirected once to the physical disk of their first extent.
/// With `wanted` set, a device with another number is `NotFound`, as is a
/// device node that does not exist.
pub(crate) fn locate<O: DeviceOpener>(
    opener: &O,
    path: &ClassifiedPath,
    wanted: Option<u32>,
    access: Access,
    max_doublings: u32,
) -> Result<Lookup<Located<O::Device>>> {
    let mut local_device_path = path.local_device_path().to_owned();
    let mut device = match opener.open(&local_device_path, access) {
        Ok(device) => device,
        Err(e) if wanted.is_some() && e.os_code() == Some(ERROR_FILE_NOT_FOUND) => {
            debug!("{local_device_path} does not exist");
            return Ok(Lookup::NotFound);
        }
        Err(e) => return Err(e),
    };
    let mut named = None;

    loop {
        let request = Request::new(IOCTL_STORAGE_GET_DEVICE_NUMBER, STORAGE_DEVICE_NUMBER_SIZE);
        match query(&device, request, &local_device_path, max_doublings)? {
            Reply::Data(buffer) => {
                let mut identity = decode(&buffer, &local_device_path)?;
                if let Some(wanted) = wanted {
                    if identity.device_number != wanted {
                        debug!(
                            "{local_device_path}: device number {} is not {wanted}",
                            identity.device_number
                        );
                        return Ok(Lookup::NotFound);
                    }
                }
                if named.is_none() && path.kind() == PathKind::DevicePath {
                    identity.partition_number = -1;
                }
                return Ok(Lookup::Resolved(Located {
                    identity,
                    local_device_path,
                    device,
                    named_path: path.local_device_path().to_owned(),
                    named,
                }));
            }
            Reply::Unavailable(ERROR_INVALID_FUNCTION)
                if named.is_none() && path.has_volume_context() =>
            {
                let disks = extents::enumerate(&device, &local_device_path, max_doublings)?;
                let Some(first) = disks.first() else {
                    return Ok(Lookup::Unsupported);
                };
                if disks.len() > 1 {
                    warn!(
                        "{local_device_path} spans {} extents, resolving through disk {} only",
                        disks.len(),
                        first.disk_number
                    );
                }
                let target = physical_drive_path(first.disk_number);
                debug!("{local_device_path}: retrying device number on {target}");
                let disk = opener.open(&target, access)?;
                named = Some(std::mem::replace(&mut device, disk));
                local_device_path = target;
            }
            Reply::Unavailable(status) => {
                debug!("{local_device_path}: no device number (os error {status})");
                return Ok(Lookup::Unsupported);
            }
        }
    }
}
