//! Adapter and device descriptors from IOCTL_STORAGE_QUERY_PROPERTY, plus
//! the device length.

use log::debug;

use crate::error::{Error, Result};
use crate::ioctl::{
    query, wire, DeviceIo, Request, IOCTL_DISK_GET_LENGTH_INFO, IOCTL_STORAGE_QUERY_PROPERTY,
};
use crate::types::{BusVersion, DeviceIdentity, StorageAdapterInfo, StorageBusType, StorageDeviceInfo};

const STORAGE_DEVICE_PROPERTY: u32 = 0;
const STORAGE_ADAPTER_PROPERTY: u32 = 1;
const PROPERTY_STANDARD_QUERY: u32 = 0;

// Fixed part of STORAGE_ADAPTER_DESCRIPTOR up to BusMinorVersion.
const ADAPTER_DESCRIPTOR_MIN: usize = 30;
// Fixed part of STORAGE_DEVICE_DESCRIPTOR up to RawPropertiesLength.
const DEVICE_DESCRIPTOR_MIN: usize = 36;
const LENGTH_INFO_SIZE: usize = 8;

/// STORAGE_PROPERTY_QUERY: property id, query type, one byte of additional
/// parameters padded out to 12 bytes.
fn property_query(property_id: u32) -> [u8; 12] {
    let mut query = [0u8; 12];
    query[0..4].copy_from_slice(&property_id.to_le_bytes());
    query[4..8].copy_from_slice(&PROPERTY_STANDARD_QUERY.to_le_bytes());
    query
}

fn truncated(structure: &'static str, needed: usize, got: usize, path: &str) -> Error {
    Error::Truncated {
        structure,
        needed,
        got,
        path: path.to_owned(),
    }
}

pub(crate) fn read_adapter<D: DeviceIo + ?Sized>(
    device: &D,
    device_number: u32,
    path: &str,
    bus_description: Option<String>,
    buffer_size: usize,
    max_doublings: u32,
) -> Result<Option<StorageAdapterInfo>> {
    let input = property_query(STORAGE_ADAPTER_PROPERTY);
    let request = Request::new(IOCTL_STORAGE_QUERY_PROPERTY, buffer_size).with_input(&input);
    let Some(buffer) = query(device, request, path, max_doublings)?.into_data() else {
        return Ok(None);
    };
    decode_adapter(&buffer, device_number, path, bus_description).map(Some)
}

fn decode_adapter(
    buffer: &[u8],
    device_number: u32,
    path: &str,
    bus_description: Option<String>,
) -> Result<StorageAdapterInfo> {
    if buffer.len() < ADAPTER_DESCRIPTOR_MIN {
        return Err(truncated(
            "STORAGE_ADAPTER_DESCRIPTOR",
            ADAPTER_DESCRIPTOR_MIN,
            buffer.len(),
            path,
        ));
    }
    let flag = |offset| wire::bool_at(buffer, offset).unwrap_or(false);
    Ok(StorageAdapterInfo {
        device_number,
        bus_type: StorageBusType::from_raw(wire::u8_at(buffer, 24).unwrap_or(0) as u32),
        maximum_transfer_bytes: wire::u32_at(buffer, 8).unwrap_or(0),
        adapter_uses_programmed_io: flag(20),
        adapter_scans_down: flag(21),
        command_queueing: flag(22),
        accelerated_transfer: flag(23),
        bus_version: BusVersion {
            major: wire::u16_at(buffer, 26).unwrap_or(0),
            minor: wire::u16_at(buffer, 28).unwrap_or(0),
        },
        bus_reported_description: bus_description.unwrap_or_default(),
    })
}

/// Reads the device descriptor for an already located device.
///
/// The length is taken from `named`, the device the caller asked about: a
/// volume's own length even when its descriptor came from the disk behind
/// it. It is only queried for elevated callers and left at zero otherwise.
pub(crate) fn read_device<D: DeviceIo + ?Sized>(
    device: &D,
    identity: &DeviceIdentity,
    path: &str,
    named: (&D, &str),
    elevated: bool,
    buffer_size: usize,
    max_doublings: u32,
) -> Result<StorageDeviceInfo> {
    let mut info = StorageDeviceInfo {
        device_type: identity.device_type,
        bus_type: StorageBusType::Unknown,
        device_number: identity.device_number,
        partition_number: identity.partition_number,
        product_id: String::new(),
        product_revision: String::new(),
        vendor_id: String::new(),
        serial_number: String::new(),
        removable_media: false,
        command_queueing: false,
        total_size: 0,
    };

    if let Some(buffer) = query_device_descriptor(device, path, buffer_size, max_doublings)? {
        decode_device(&buffer, path, &mut info)?;
    }

    if elevated {
        let (named_device, named_path) = named;
        info.total_size = read_length(named_device, named_path, max_doublings)?.unwrap_or(0);
    } else {
        debug!("{path}: not elevated, skipping length query");
    }
    Ok(info)
}

fn query_device_descriptor<D: DeviceIo + ?Sized>(
    device: &D,
    path: &str,
    buffer_size: usize,
    max_doublings: u32,
) -> Result<Option<Vec<u8>>> {
    let input = property_query(STORAGE_DEVICE_PROPERTY);
    let request = Request::new(IOCTL_STORAGE_QUERY_PROPERTY, buffer_size).with_input(&input);
    let Some(buffer) = query(device, request, path, max_doublings)?.into_data() else {
        return Ok(None);
    };

    // A short buffer can still succeed with a truncated descriptor whose
    // header carries the full size.
    let declared = wire::u32_at(&buffer, 4).unwrap_or(0) as usize;
    if declared <= buffer.len() || buffer.len() < buffer_size {
        return Ok(Some(buffer));
    }
    debug!("{path}: device descriptor needs {declared} bytes, querying again");
    let request = Request::new(IOCTL_STORAGE_QUERY_PROPERTY, declared).with_input(&input);
    Ok(query(device, request, path, max_doublings)?.into_data())
}

fn decode_device(buffer: &[u8], path: &str, info: &mut StorageDeviceInfo) -> Result<()> {
    if buffer.len() < DEVICE_DESCRIPTOR_MIN {
        return Err(truncated(
            "STORAGE_DEVICE_DESCRIPTOR",
            DEVICE_DESCRIPTOR_MIN,
            buffer.len(),
            path,
        ));
    }
    let string_at = |slot| descriptor_string(buffer, wire::u32_at(buffer, slot).unwrap_or(0));

    info.removable_media = wire::bool_at(buffer, 10).unwrap_or(false);
    info.command_queueing = wire::bool_at(buffer, 11).unwrap_or(false);
    info.vendor_id = string_at(12);
    info.product_id = string_at(16);
    info.product_revision = string_at(20);
    info.serial_number = string_at(24);
    info.bus_type = StorageBusType::from_raw(wire::u32_at(buffer, 28).unwrap_or(0));
    Ok(())
}

/// A NUL-terminated 8-bit string at `offset`. Offset zero means absent, and
/// anything one character or shorter after trimming is placeholder noise.
fn descriptor_string(buffer: &[u8], offset: u32) -> String {
    let offset = offset as usize;
    if offset == 0 || offset >= buffer.len() {
        return String::new();
    }
    let tail = &buffer[offset..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    let text: String = tail[..end].iter().map(|&b| b as char).collect();
    let text = text.trim();
    if text.chars().count() <= 1 {
        String::new()
    } else {
        text.to_owned()
    }
}

pub(crate) fn read_length<D: DeviceIo + ?Sized>(
    device: &D,
    path: &str,
    max_doublings: u32,
) -> Result<Option<i64>> {
    let request = Request::new(IOCTL_DISK_GET_LENGTH_INFO, LENGTH_INFO_SIZE);
    let Some(buffer) = query(device, request, path, max_doublings)?.into_data() else {
        return Ok(None);
    };
    wire::i64_at(&buffer, 0)
        .map(Some)
        .ok_or_else(|| truncated("GET_LENGTH_INFORMATION", LENGTH_INFO_SIZE, buffer.len(), path))
}
