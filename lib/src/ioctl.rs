use log::debug;

use crate::error::{Error, Result};

pub const IOCTL_STORAGE_GET_DEVICE_NUMBER: u32 = 0x002D_1080;
pub const IOCTL_STORAGE_QUERY_PROPERTY: u32 = 0x002D_1400;
pub const IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS: u32 = 0x0056_0000;
pub const IOCTL_DISK_GET_LENGTH_INFO: u32 = 0x0007_405C;
pub const IOCTL_DISK_GET_DRIVE_LAYOUT_EX: u32 = 0x0007_0050;
pub const IOCTL_DISK_GET_DRIVE_GEOMETRY_EX: u32 = 0x0007_00A0;

pub const ERROR_INVALID_FUNCTION: u32 = 1;
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_NOT_READY: u32 = 21;
pub const ERROR_NOT_SUPPORTED: u32 = 50;
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_MORE_DATA: u32 = 234;

/// Default cap on how many times a query buffer may double.
pub const DEFAULT_MAX_BUFFER_DOUBLINGS: u32 = 16;

/// A device node that accepts control requests.
///
/// `control` writes the reply into `output` and returns the number of bytes
/// written, or the raw OS status code on failure.
pub trait DeviceIo {
    fn control(
        &self,
        control_code: u32,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> std::result::Result<usize, u32>;
}

impl<T: DeviceIo + ?Sized> DeviceIo for &T {
    fn control(
        &self,
        control_code: u32,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> std::result::Result<usize, u32> {
        (**self).control(control_code, input, output)
    }
}

/// Outcome of a query that did not fail fatally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    /// The reply bytes, truncated to what the device returned.
    Data(Vec<u8>),
    /// The device has no such data; carries the status that said so.
    Unavailable(u32),
}

impl Reply {
    pub(crate) fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Reply::Data(data) => Some(data),
            Reply::Unavailable(_) => None,
        }
    }
}

pub(crate) struct Request<'a> {
    pub control_code: u32,
    pub input: Option<&'a [u8]>,
    pub initial_size: usize,
}

impl<'a> Request<'a> {
    pub(crate) fn new(control_code: u32, initial_size: usize) -> Self {
        Self {
            control_code,
            input: None,
            initial_size,
        }
    }

    pub(crate) fn with_input(mut self, input: &'a [u8]) -> Self {
        self.input = Some(input);
        self
    }
}

pub(crate) fn is_insufficient_buffer(status: u32) -> bool {
    matches!(status, ERROR_INSUFFICIENT_BUFFER | ERROR_MORE_DATA)
}

/// Statuses that mean "this device has no such data" rather than failure:
/// not-ready media, dynamic-disk volumes and device classes like image mounts.
pub(crate) fn is_no_data(status: u32) -> bool {
    matches!(
        status,
        ERROR_NOT_READY | ERROR_INVALID_FUNCTION | ERROR_NOT_SUPPORTED
    )
}

pub(crate) fn control_code_name(control_code: u32) -> &'static str {
    match control_code {
        IOCTL_STORAGE_GET_DEVICE_NUMBER => "IOCTL_STORAGE_GET_DEVICE_NUMBER",
        IOCTL_STORAGE_QUERY_PROPERTY => "IOCTL_STORAGE_QUERY_PROPERTY",
        IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS => "IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS",
        IOCTL_DISK_GET_LENGTH_INFO => "IOCTL_DISK_GET_LENGTH_INFO",
        IOCTL_DISK_GET_DRIVE_LAYOUT_EX => "IOCTL_DISK_GET_DRIVE_LAYOUT_EX",
        IOCTL_DISK_GET_DRIVE_GEOMETRY_EX => "IOCTL_DISK_GET_DRIVE_GEOMETRY_EX",
        _ => "DeviceIoControl",
    }
}

/// Issues `request`, doubling the output buffer each time the device reports
/// it as too small, at most `max_doublings` times.
pub(crate) fn query<D: DeviceIo + ?Sized>(
    device: &D,
    request: Request<'_>,
    path: &str,
    max_doublings: u32,
) -> Result<Reply> {
    let name = control_code_name(request.control_code);
    let mut size = request.initial_size.max(1);
    let mut doublings = 0u32;

    loop {
        let mut buffer = vec![0u8; size];
        match device.control(request.control_code, request.input, &mut buffer) {
            Ok(returned) => {
                debug!("{path}: {name} returned {returned} bytes into {size}");
                buffer.truncate(returned.min(size));
                return Ok(Reply::Data(buffer));
            }
            Err(status) if is_insufficient_buffer(status) => {
                let grown = size.checked_mul(2);
                match grown {
                    Some(grown) if doublings < max_doublings => {
                        debug!("{path}: {name} buffer too small, reallocating to {grown}");
                        doublings += 1;
                        size = grown;
                    }
                    _ => {
                        return Err(Error::BufferLimit {
                            control_code: request.control_code,
                            size,
                            path: path.to_owned(),
                        })
                    }
                }
            }
            Err(status) if is_no_data(status) => {
                debug!("{path}: {name} has no data (os error {status})");
                return Ok(Reply::Unavailable(status));
            }
            Err(status) => {
                return Err(Error::Os {
                    operation: name,
                    code: status,
                    path: path.to_owned(),
                })
            }
        }
    }
}

/// Little-endian field readers over a reply buffer. Each returns `None`
/// when the field would run past the end of the bytes returned.
pub(crate) mod wire {
    use uuid::Uuid;

    pub(crate) fn u8_at(buf: &[u8], offset: usize) -> Option<u8> {
        buf.get(offset).copied()
    }

    pub(crate) fn bool_at(buf: &[u8], offset: usize) -> Option<bool> {
        u8_at(buf, offset).map(|b| b != 0)
    }

    pub(crate) fn u16_at(buf: &[u8], offset: usize) -> Option<u16> {
        let bytes = buf.get(offset..offset.checked_add(2)?)?;
        Some(u16::from_le_bytes(bytes.try_into().ok()?))
    }

    pub(crate) fn u32_at(buf: &[u8], offset: usize) -> Option<u32> {
        let bytes = buf.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    pub(crate) fn i64_at(buf: &[u8], offset: usize) -> Option<i64> {
        let bytes = buf.get(offset..offset.checked_add(8)?)?;
        Some(i64::from_le_bytes(bytes.try_into().ok()?))
    }

    pub(crate) fn u64_at(buf: &[u8], offset: usize) -> Option<u64> {
        i64_at(buf, offset).map(|v| v as u64)
    }

    /// GUIDs are stored with their first three groups little-endian.
    pub(crate) fn guid_at(buf: &[u8], offset: usize) -> Option<Uuid> {
        let bytes = buf.get(offset..offset.checked_add(16)?)?;
        Some(Uuid::from_bytes_le(bytes.try_into().ok()?))
    }
}
