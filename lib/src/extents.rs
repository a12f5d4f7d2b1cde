use log::debug;

use crate::error::{Error, Result};
use crate::ioctl::{query, wire, DeviceIo, Request, IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS};
use crate::types::DiskExtent;

// VOLUME_DISK_EXTENTS: extent count, padding, then DISK_EXTENT records.
const EXTENTS_HEADER: usize = 8;
const DISK_EXTENT_SIZE: usize = 24;

/// Lists the physical-disk extents backing the volume open on `device`.
///
/// Devices without extents (optical drives, mounted images) give an empty
/// list.
pub(crate) fn enumerate<D: DeviceIo + ?Sized>(
    device: &D,
    path: &str,
    max_doublings: u32,
) -> Result<Vec<DiskExtent>> {
    let request = Request::new(
        IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS,
        EXTENTS_HEADER + DISK_EXTENT_SIZE,
    );
    let Some(buffer) = query(device, request, path, max_doublings)?.into_data() else {
        return Ok(Vec::new());
    };
    decode(&buffer, path)
}

fn decode(buffer: &[u8], path: &str) -> Result<Vec<DiskExtent>> {
    let count = wire::u32_at(buffer, 0).ok_or_else(|| Error::Truncated {
        structure: "VOLUME_DISK_EXTENTS",
        needed: EXTENTS_HEADER,
        got: buffer.len(),
        path: path.to_owned(),
    })? as usize;

    let needed = count
        .checked_mul(DISK_EXTENT_SIZE)
        .and_then(|n| n.checked_add(EXTENTS_HEADER))
        .unwrap_or(usize::MAX);
    if buffer.len() < needed {
        return Err(Error::Truncated {
            structure: "VOLUME_DISK_EXTENTS",
            needed,
            got: buffer.len(),
            path: path.to_owned(),
        });
    }

    let extents: Vec<DiskExtent> = (0..count)
        .filter_map(|i| {
            let at = EXTENTS_HEADER + i * DISK_EXTENT_SIZE;
            Some(DiskExtent {
                disk_number: wire::u32_at(buffer, at)?,
                starting_offset: wire::i64_at(buffer, at + 8)?,
                length: wire::i64_at(buffer, at + 16)?,
            })
        })
        .collect();
    debug!("{path}: {} disk extent(s)", extents.len());
    Ok(extents)
}
