//! Scripted devices and byte-exact reply builders for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use uuid::Uuid;

use crate::device::{Access, DeviceOpener};
use crate::error::{Error, Result};
use crate::ioctl::{
    DeviceIo, ERROR_FILE_NOT_FOUND, ERROR_INSUFFICIENT_BUFFER, ERROR_NOT_SUPPORTED,
    IOCTL_STORAGE_QUERY_PROPERTY,
};

#[derive(Debug, Default)]
struct State {
    replies: HashMap<(u32, Option<u32>), VecDeque<std::result::Result<Vec<u8>, u32>>>,
    buffer_sizes: HashMap<u32, Vec<usize>>,
    inputs: HashMap<u32, Vec<Vec<u8>>>,
}

/// Replays scripted replies per control code, optionally narrowed by the
/// property id leading the input buffer. The last scripted reply repeats; a
/// reply larger than the caller's buffer is answered with
/// ERROR_INSUFFICIENT_BUFFER and stays queued. Unscripted codes fail with
/// ERROR_NOT_SUPPORTED.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedDevice {
    state: Rc<RefCell<State>>,
}

impl ScriptedDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(&self, control_code: u32, bytes: Vec<u8>) -> &Self {
        self.push((control_code, None), Ok(bytes))
    }

    pub(crate) fn fail(&self, control_code: u32, status: u32) -> &Self {
        self.push((control_code, None), Err(status))
    }

    /// Scripts IOCTL_STORAGE_QUERY_PROPERTY for one property id.
    pub(crate) fn reply_property(&self, property_id: u32, bytes: Vec<u8>) -> &Self {
        self.push((IOCTL_STORAGE_QUERY_PROPERTY, Some(property_id)), Ok(bytes))
    }

    pub(crate) fn fail_property(&self, property_id: u32, status: u32) -> &Self {
        self.push((IOCTL_STORAGE_QUERY_PROPERTY, Some(property_id)), Err(status))
    }

    fn push(
        &self,
        key: (u32, Option<u32>),
        reply: std::result::Result<Vec<u8>, u32>,
    ) -> &Self {
        self.state
            .borrow_mut()
            .replies
            .entry(key)
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn buffer_sizes(&self, control_code: u32) -> Vec<usize> {
        self.state
            .borrow()
            .buffer_sizes
            .get(&control_code)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn inputs(&self, control_code: u32) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .inputs
            .get(&control_code)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn calls(&self, control_code: u32) -> usize {
        self.buffer_sizes(control_code).len()
    }
}

impl DeviceIo for ScriptedDevice {
    fn control(
        &self,
        control_code: u32,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> std::result::Result<usize, u32> {
        let mut state = self.state.borrow_mut();
        state
            .buffer_sizes
            .entry(control_code)
            .or_default()
            .push(output.len());
        if let Some(input) = input {
            state
                .inputs
                .entry(control_code)
                .or_default()
                .push(input.to_vec());
        }

        let narrowed = (control_code, input.and_then(|i| i.get(0..4)).map(|b| {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        }));
        let key = if state.replies.contains_key(&narrowed) {
            narrowed
        } else {
            (control_code, None)
        };
        let Some(queue) = state.replies.get_mut(&key) else {
            return Err(ERROR_NOT_SUPPORTED);
        };
        let reply = match queue.front() {
            Some(reply) => reply.clone(),
            None => return Err(ERROR_NOT_SUPPORTED),
        };
        match reply {
            Ok(bytes) if bytes.len() > output.len() => Err(ERROR_INSUFFICIENT_BUFFER),
            Ok(bytes) => {
                if queue.len() > 1 {
                    queue.pop_front();
                }
                output[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Err(status) => {
                if queue.len() > 1 {
                    queue.pop_front();
                }
                Err(status)
            }
        }
    }
}

/// Hands out [`ScriptedDevice`]s by local device path and records each open.
#[derive(Debug, Default)]
pub(crate) struct ScriptedOpener {
    devices: HashMap<String, ScriptedDevice>,
    opened: RefCell<Vec<(String, Access)>>,
    elevated: bool,
}

impl ScriptedOpener {
    pub(crate) fn new(elevated: bool) -> Self {
        Self {
            elevated,
            ..Self::default()
        }
    }

    pub(crate) fn device(&mut self, path: &str) -> ScriptedDevice {
        self.devices.entry(path.to_owned()).or_default().clone()
    }

    pub(crate) fn opened(&self) -> Vec<(String, Access)> {
        self.opened.borrow().clone()
    }
}

impl DeviceOpener for ScriptedOpener {
    type Device = ScriptedDevice;

    fn open(&self, local_device_path: &str, access: Access) -> Result<ScriptedDevice> {
        self.opened
            .borrow_mut()
            .push((local_device_path.to_owned(), access));
        self.devices
            .get(local_device_path)
            .cloned()
            .ok_or_else(|| Error::Os {
                operation: "CreateFileW",
                code: ERROR_FILE_NOT_FOUND,
                path: local_device_path.to_owned(),
            })
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }
}

pub(crate) const FILE_DEVICE_CD_ROM: u32 = 0x02;
pub(crate) const FILE_DEVICE_DISK: u32 = 0x07;

pub(crate) fn device_number(device_type: u32, number: u32, partition: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.extend_from_slice(&device_type.to_le_bytes());
    buf.extend_from_slice(&number.to_le_bytes());
    buf.extend_from_slice(&partition.to_le_bytes());
    buf
}

pub(crate) fn disk_extents(extents: &[(u32, i64, i64)]) -> Vec<u8> {
    let mut buf = vec![0u8; 8 + 24 * extents.len().max(1)];
    buf[0..4].copy_from_slice(&(extents.len() as u32).to_le_bytes());
    for (i, (disk, start, length)) in extents.iter().enumerate() {
        let at = 8 + 24 * i;
        buf[at..at + 4].copy_from_slice(&disk.to_le_bytes());
        buf[at + 8..at + 16].copy_from_slice(&start.to_le_bytes());
        buf[at + 16..at + 24].copy_from_slice(&length.to_le_bytes());
    }
    buf
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AdapterBytes {
    pub max_transfer: u32,
    pub uses_pio: bool,
    pub scans_down: bool,
    pub command_queueing: bool,
    pub accelerated_transfer: bool,
    pub bus_type: u8,
    pub bus_major: u16,
    pub bus_minor: u16,
}

impl AdapterBytes {
    pub(crate) fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        buf[0..4].copy_from_slice(&32u32.to_le_bytes());
        buf[4..8].copy_from_slice(&32u32.to_le_bytes());
        buf[8..12].copy_from_slice(&self.max_transfer.to_le_bytes());
        buf[20] = self.uses_pio as u8;
        buf[21] = self.scans_down as u8;
        buf[22] = self.command_queueing as u8;
        buf[23] = self.accelerated_transfer as u8;
        buf[24] = self.bus_type;
        buf[26..28].copy_from_slice(&self.bus_major.to_le_bytes());
        buf[28..30].copy_from_slice(&self.bus_minor.to_le_bytes());
        buf
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceBytes<'a> {
    pub removable: bool,
    pub command_queueing: bool,
    pub bus_type: u32,
    pub vendor: Option<&'a str>,
    pub product: Option<&'a str>,
    pub revision: Option<&'a str>,
    pub serial: Option<&'a str>,
}

impl DeviceBytes<'_> {
    pub(crate) fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 40];
        buf[0..4].copy_from_slice(&40u32.to_le_bytes());
        buf[10] = self.removable as u8;
        buf[11] = self.command_queueing as u8;
        buf[28..32].copy_from_slice(&self.bus_type.to_le_bytes());
        let fields = [
            (12, self.vendor),
            (16, self.product),
            (20, self.revision),
            (24, self.serial),
        ];
        for (slot, text) in fields {
            if let Some(text) = text {
                let offset = buf.len() as u32;
                buf.extend_from_slice(text.as_bytes());
                buf.push(0);
                buf[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
            }
        }
        let size = buf.len() as u32;
        buf[4..8].copy_from_slice(&size.to_le_bytes());
        buf
    }
}

pub(crate) fn length_info(length: i64) -> Vec<u8> {
    length.to_le_bytes().to_vec()
}

pub(crate) fn geometry(media_type: u32, bytes_per_sector: u32, disk_size: i64) -> Vec<u8> {
    let mut buf = vec![0u8; 32];
    buf[0..8].copy_from_slice(&(disk_size / (255 * 63 * bytes_per_sector.max(1) as i64)).to_le_bytes());
    buf[8..12].copy_from_slice(&media_type.to_le_bytes());
    buf[12..16].copy_from_slice(&255u32.to_le_bytes());
    buf[16..20].copy_from_slice(&63u32.to_le_bytes());
    buf[20..24].copy_from_slice(&bytes_per_sector.to_le_bytes());
    buf[24..32].copy_from_slice(&disk_size.to_le_bytes());
    buf
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MbrEntry {
    pub number: u32,
    pub start: i64,
    pub length: i64,
    pub partition_type: u8,
    pub boot: bool,
    pub recognized: bool,
    pub hidden_sectors: u32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GptEntry<'a> {
    pub number: u32,
    pub start: i64,
    pub length: i64,
    pub partition_type: Uuid,
    pub partition_id: Uuid,
    pub attributes: u64,
    pub name: &'a str,
}

const LAYOUT_HEADER: usize = 48;
const ENTRY: usize = 144;

fn layout_header(style: u32, count: u32) -> Vec<u8> {
    let mut buf = vec![0u8; LAYOUT_HEADER];
    buf[0..4].copy_from_slice(&style.to_le_bytes());
    buf[4..8].copy_from_slice(&count.to_le_bytes());
    buf
}

fn entry_common(style: u32, number: u32, start: i64, length: i64) -> Vec<u8> {
    let mut entry = vec![0u8; ENTRY];
    entry[0..4].copy_from_slice(&style.to_le_bytes());
    entry[8..16].copy_from_slice(&start.to_le_bytes());
    entry[16..24].copy_from_slice(&length.to_le_bytes());
    entry[24..28].copy_from_slice(&number.to_le_bytes());
    entry
}

pub(crate) fn mbr_layout(signature: u32, entries: &[MbrEntry]) -> Vec<u8> {
    let mut buf = layout_header(0, entries.len() as u32);
    buf[8..12].copy_from_slice(&signature.to_le_bytes());
    for e in entries {
        let mut entry = entry_common(0, e.number, e.start, e.length);
        entry[32] = e.partition_type;
        entry[33] = e.boot as u8;
        entry[34] = e.recognized as u8;
        entry[36..40].copy_from_slice(&e.hidden_sectors.to_le_bytes());
        buf.extend_from_slice(&entry);
    }
    buf
}

pub(crate) fn gpt_layout(
    disk_id: Uuid,
    starting_usable_offset: i64,
    usable_length: i64,
    max_partition_count: u32,
    entries: &[GptEntry<'_>],
) -> Vec<u8> {
    let mut buf = layout_header(1, entries.len() as u32);
    buf[8..24].copy_from_slice(&disk_id.to_bytes_le());
    buf[24..32].copy_from_slice(&starting_usable_offset.to_le_bytes());
    buf[32..40].copy_from_slice(&usable_length.to_le_bytes());
    buf[40..44].copy_from_slice(&max_partition_count.to_le_bytes());
    for e in entries {
        let mut entry = entry_common(1, e.number, e.start, e.length);
        entry[32..48].copy_from_slice(&e.partition_type.to_bytes_le());
        entry[48..64].copy_from_slice(&e.partition_id.to_bytes_le());
        entry[64..72].copy_from_slice(&e.attributes.to_le_bytes());
        for (i, unit) in e.name.encode_utf16().take(36).enumerate() {
            entry[72 + 2 * i..74 + 2 * i].copy_from_slice(&unit.to_le_bytes());
        }
        buf.extend_from_slice(&entry);
    }
    buf
}

pub(crate) fn raw_layout() -> Vec<u8> {
    layout_header(2, 0)
}

/// Overwrites the partition count in an already built layout.
pub(crate) fn with_partition_count(mut layout: Vec<u8>, count: u32) -> Vec<u8> {
    layout[4..8].copy_from_slice(&count.to_le_bytes());
    layout
}
