//! Drive layout decoding for MBR and GPT disks.

use std::collections::HashMap;
use std::sync::LazyLock;

use log::{debug, warn};
use uuid::{uuid, Uuid};

use crate::error::{Error, Result};
use crate::ioctl::{
    query, wire, DeviceIo, Request, IOCTL_DISK_GET_DRIVE_GEOMETRY_EX,
    IOCTL_DISK_GET_DRIVE_LAYOUT_EX,
};
use crate::types::{
    GptLayout, GptPartitionInfo, GptPartitionType, MbrLayout, MbrPartitionInfo, MediaType,
    PartitionLayout, PartitionStyle, StoragePartitionInfo,
};

/// DRIVE_LAYOUT_INFORMATION_EX up to the first PARTITION_INFORMATION_EX.
const LAYOUT_HEADER_SIZE: usize = 48;
const PARTITION_ENTRY_SIZE: usize = 144;
/// Layouts claiming more entries than this are corrupt.
pub const MAX_PARTITION_COUNT: u32 = 256;

const PARTITION_ENTRY_UNUSED: u8 = 0x00;
const PARTITION_LDM: u8 = 0x42;

const GEOMETRY_EX_SIZE: usize = 32;
const GEOMETRY_INITIAL_SIZE: usize = 256;
const GPT_NAME_UNITS: usize = 36;

static GPT_PARTITION_TYPES: LazyLock<HashMap<Uuid, GptPartitionType>> = LazyLock::new(|| {
    use GptPartitionType::*;
    HashMap::from([
        (Uuid::nil(), Unused),
        (uuid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b"), EfiSystem),
        (uuid!("e3c9e316-0b5c-4db8-817d-f92df00215ae"), MicrosoftReserved),
        (uuid!("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7"), BasicData),
        (uuid!("5808c8aa-7e8f-42e0-85d2-e1e90434cfb3"), LdmMetadata),
        (uuid!("af9b60a0-1431-4f62-bc68-3311714a69ad"), LdmData),
        (uuid!("de94bba4-06d1-4d40-a16a-bfd50179d6ac"), MicrosoftRecovery),
        (uuid!("e75caf8f-f680-4cee-afa3-b001e56efc2d"), StorageSpaces),
        (uuid!("558d43c5-a1ac-43c0-aac8-d1472b2923d1"), StorageReplica),
        (uuid!("024dee41-33e7-11d3-9d69-0008c781f39f"), MbrPartitionScheme),
        (uuid!("21686148-6449-6e6f-744e-656564454649"), BiosBoot),
        (uuid!("0fc63daf-8483-4772-8e79-3d69d8477de4"), LinuxFilesystem),
        (uuid!("0657fd6d-a4ab-43c4-84e5-0933c84b4f4f"), LinuxSwap),
        (uuid!("e6d6d379-f507-44c2-a23c-238f2a3df928"), LinuxLvm),
        (uuid!("a19d880f-05fc-4d3b-a006-743f0f84911e"), LinuxRaid),
        (uuid!("48465300-0000-11aa-aa11-00306543ecac"), AppleHfsPlus),
        (uuid!("7c3457ef-0000-11aa-aa11-00306543ecac"), AppleApfs),
    ])
});

pub fn gpt_partition_type(type_id: &Uuid) -> GptPartitionType {
    GPT_PARTITION_TYPES
        .get(type_id)
        .copied()
        .unwrap_or(GptPartitionType::Unknown)
}

/// Reads the partition table and geometry of the disk open on `device`.
///
/// `total_size` is the size of what backs the target: on a basic disk a
/// target with a positive `partition_number` gets the length of that
/// partition entry, anything else the whole disk from the geometry. Volumes
/// on dynamic disks are not partition entries, so they get the whole disk.
///
/// Devices without a layout (optical drives) and layouts that fail the
/// sanity checks give `None`.
pub(crate) fn read<D: DeviceIo + ?Sized>(
    device: &D,
    device_number: u32,
    partition_number: i32,
    path: &str,
    partition_capacity: usize,
    max_doublings: u32,
) -> Result<Option<StoragePartitionInfo>> {
    let initial_size = PARTITION_ENTRY_SIZE
        .checked_mul(partition_capacity)
        .and_then(|entries| entries.checked_add(LAYOUT_HEADER_SIZE))
        .ok_or_else(|| Error::BufferLimit {
            control_code: IOCTL_DISK_GET_DRIVE_LAYOUT_EX,
            size: usize::MAX,
            path: path.to_owned(),
        })?;
    let request = Request::new(IOCTL_DISK_GET_DRIVE_LAYOUT_EX, initial_size);
    let Some(buffer) = query(device, request, path, max_doublings)?.into_data() else {
        return Ok(None);
    };
    let Some((partition_style, partition_count, layout)) = decode_layout(&buffer, path)? else {
        return Ok(None);
    };

    let (media_type, bytes_per_sector, disk_size) = read_geometry(device, path, max_doublings)?;
    let is_on_dynamic_disk = match &layout {
        PartitionLayout::Gpt(gpt) => gpt.partitions.iter().any(|p| p.partition_type.is_ldm()),
        PartitionLayout::Mbr(mbr) => mbr
            .partitions
            .iter()
            .any(|p| p.partition_type == PARTITION_LDM),
        PartitionLayout::Raw => false,
    };
    let total_size = match u32::try_from(partition_number) {
        Ok(number) if number > 0 && !is_on_dynamic_disk => {
            entry_length(&layout, number).unwrap_or_else(|| {
                debug!("{path}: no partition entry {number}, using the disk size");
                disk_size
            })
        }
        _ => disk_size,
    };

    Ok(Some(StoragePartitionInfo {
        device_number,
        partition_style,
        partition_count,
        media_type,
        bytes_per_sector,
        total_size,
        is_on_dynamic_disk,
        layout,
    }))
}

fn entry_length(layout: &PartitionLayout, partition_number: u32) -> Option<i64> {
    match layout {
        PartitionLayout::Gpt(gpt) => gpt
            .partitions
            .iter()
            .find(|p| p.partition_number == partition_number)
            .map(|p| p.partition_length),
        PartitionLayout::Mbr(mbr) => mbr
            .partitions
            .iter()
            .find(|p| p.partition_number == partition_number)
            .map(|p| p.partition_length),
        PartitionLayout::Raw => None,
    }
}

fn decode_layout(
    buffer: &[u8],
    path: &str,
) -> Result<Option<(PartitionStyle, u32, PartitionLayout)>> {
    if buffer.len() < LAYOUT_HEADER_SIZE {
        return Err(Error::Truncated {
            structure: "DRIVE_LAYOUT_INFORMATION_EX",
            needed: LAYOUT_HEADER_SIZE,
            got: buffer.len(),
            path: path.to_owned(),
        });
    }
    let style = PartitionStyle::from_raw(wire::u32_at(buffer, 0).unwrap_or(u32::MAX));
    let count = wire::u32_at(buffer, 4).unwrap_or(0);

    if count > MAX_PARTITION_COUNT {
        warn!("{path}: drive layout claims {count} partitions, refusing to decode");
        return Ok(None);
    }
    let needed = LAYOUT_HEADER_SIZE + PARTITION_ENTRY_SIZE * count as usize;
    if style != PartitionStyle::Raw && buffer.len() < needed {
        warn!(
            "{path}: drive layout claims {count} partitions but only {} bytes came back",
            buffer.len()
        );
        return Ok(None);
    }

    let entries = move || {
        (0..count as usize).map(move |i| {
            let at = LAYOUT_HEADER_SIZE + i * PARTITION_ENTRY_SIZE;
            &buffer[at..at + PARTITION_ENTRY_SIZE]
        })
    };

    let decoded = match style {
        PartitionStyle::Gpt => {
            let partitions: Vec<GptPartitionInfo> = entries().map(decode_gpt_entry).collect();
            debug!("{path}: GPT with {} partition(s)", partitions.len());
            (
                style,
                count,
                PartitionLayout::Gpt(GptLayout {
                    disk_id: wire::guid_at(buffer, 8).unwrap_or_default(),
                    starting_usable_offset: wire::i64_at(buffer, 24).unwrap_or(0),
                    usable_length: wire::i64_at(buffer, 32).unwrap_or(0),
                    max_partition_count: wire::u32_at(buffer, 40).unwrap_or(0),
                    partitions,
                }),
            )
        }
        PartitionStyle::Mbr => {
            // The OS reports MBR slots in groups of four, unused ones included.
            let partitions: Vec<MbrPartitionInfo> = entries()
                .map(decode_mbr_entry)
                .filter(|p| p.partition_type != PARTITION_ENTRY_UNUSED)
                .collect();
            debug!(
                "{path}: MBR with {} of {count} slot(s) in use",
                partitions.len()
            );
            (
                style,
                partitions.len() as u32,
                PartitionLayout::Mbr(MbrLayout {
                    signature: wire::u32_at(buffer, 8).unwrap_or(0),
                    checksum: wire::u32_at(buffer, 12).unwrap_or(0),
                    reported_slot_count: count,
                    partitions,
                }),
            )
        }
        PartitionStyle::Raw => (style, count, PartitionLayout::Raw),
    };
    Ok(Some(decoded))
}

fn decode_gpt_entry(entry: &[u8]) -> GptPartitionInfo {
    let partition_type_id = wire::guid_at(entry, 32).unwrap_or_default();
    let name_units: Vec<u16> = (0..GPT_NAME_UNITS)
        .filter_map(|i| wire::u16_at(entry, 72 + 2 * i))
        .take_while(|&unit| unit != 0)
        .collect();
    GptPartitionInfo {
        starting_offset: wire::i64_at(entry, 8).unwrap_or(0),
        partition_length: wire::i64_at(entry, 16).unwrap_or(0),
        partition_number: wire::u32_at(entry, 24).unwrap_or(0),
        rewrite_partition: wire::bool_at(entry, 28).unwrap_or(false),
        is_service_partition: wire::bool_at(entry, 29).unwrap_or(false),
        partition_type: gpt_partition_type(&partition_type_id),
        partition_type_id,
        partition_id: wire::guid_at(entry, 48).unwrap_or_default(),
        attributes: wire::u64_at(entry, 64).unwrap_or(0),
        name: String::from_utf16_lossy(&name_units),
    }
}

fn decode_mbr_entry(entry: &[u8]) -> MbrPartitionInfo {
    MbrPartitionInfo {
        starting_offset: wire::i64_at(entry, 8).unwrap_or(0),
        partition_length: wire::i64_at(entry, 16).unwrap_or(0),
        partition_number: wire::u32_at(entry, 24).unwrap_or(0),
        rewrite_partition: wire::bool_at(entry, 28).unwrap_or(false),
        is_service_partition: wire::bool_at(entry, 29).unwrap_or(false),
        partition_type: wire::u8_at(entry, 32).unwrap_or(PARTITION_ENTRY_UNUSED),
        boot_indicator: wire::bool_at(entry, 33).unwrap_or(false),
        recognized_partition: wire::bool_at(entry, 34).unwrap_or(false),
        hidden_sectors: wire::u32_at(entry, 36).unwrap_or(0),
        partition_id: wire::guid_at(entry, 40).unwrap_or_default(),
    }
}

/// Media type, bytes per sector and disk size from DISK_GEOMETRY_EX.
fn read_geometry<D: DeviceIo + ?Sized>(
    device: &D,
    path: &str,
    max_doublings: u32,
) -> Result<(MediaType, u32, i64)> {
    let request = Request::new(IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, GEOMETRY_INITIAL_SIZE);
    let Some(buffer) = query(device, request, path, max_doublings)?.into_data() else {
        return Ok((MediaType::Unknown, 0, 0));
    };
    if buffer.len() < GEOMETRY_EX_SIZE {
        return Err(Error::Truncated {
            structure: "DISK_GEOMETRY_EX",
            needed: GEOMETRY_EX_SIZE,
            got: buffer.len(),
            path: path.to_owned(),
        });
    }
    Ok((
        MediaType::from_raw(wire::u32_at(&buffer, 8).unwrap_or(0)),
        wire::u32_at(&buffer, 20).unwrap_or(0),
        wire::i64_at(&buffer, 24).unwrap_or(0),
    ))
}
