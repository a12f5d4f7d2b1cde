use std::fmt;

use uuid::Uuid;

/// FILE_DEVICE_* class reported alongside a device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceType {
    CdRom,
    Disk,
    Dvd,
    VirtualDisk,
    MassStorage,
    Other(u32),
}

impl DeviceType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x02 => DeviceType::CdRom,
            0x07 => DeviceType::Disk,
            0x24 => DeviceType::VirtualDisk,
            0x2d => DeviceType::MassStorage,
            0x33 => DeviceType::Dvd,
            other => DeviceType::Other(other),
        }
    }

    pub fn is_optical(self) -> bool {
        matches!(self, DeviceType::CdRom | DeviceType::Dvd)
    }
}

/// Which physical disk a path lives on, and where on it.
///
/// `partition_number` is `-1` when the target cannot be partitioned or was
/// reached through a raw device path, `0` for the whole device and positive
/// for a partition or logical volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceIdentity {
    pub device_type: DeviceType,
    pub device_number: u32,
    pub partition_number: i32,
}

/// STORAGE_BUS_TYPE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StorageBusType {
    Unknown,
    Scsi,
    Atapi,
    Ata,
    Ieee1394,
    Ssa,
    Fibre,
    Usb,
    Raid,
    Iscsi,
    Sas,
    Sata,
    Sd,
    Mmc,
    Virtual,
    FileBackedVirtual,
    Spaces,
    Nvme,
    Scm,
    Ufs,
    NvmeOf,
    Other(u32),
}

impl StorageBusType {
    pub fn from_raw(raw: u32) -> Self {
        use StorageBusType::*;
        match raw {
            0x00 => Unknown,
            0x01 => Scsi,
            0x02 => Atapi,
            0x03 => Ata,
            0x04 => Ieee1394,
            0x05 => Ssa,
            0x06 => Fibre,
            0x07 => Usb,
            0x08 => Raid,
            0x09 => Iscsi,
            0x0A => Sas,
            0x0B => Sata,
            0x0C => Sd,
            0x0D => Mmc,
            0x0E => Virtual,
            0x0F => FileBackedVirtual,
            0x10 => Spaces,
            0x11 => Nvme,
            0x12 => Scm,
            0x13 => Ufs,
            0x14 => NvmeOf,
            other => Other(other),
        }
    }

    pub fn name(self) -> &'static str {
        use StorageBusType::*;
        match self {
            Unknown => "Unknown",
            Scsi => "SCSI",
            Atapi => "ATAPI",
            Ata => "ATA",
            Ieee1394 => "1394",
            Ssa => "SSA",
            Fibre => "Fibre",
            Usb => "USB",
            Raid => "RAID",
            Iscsi => "iSCSI",
            Sas => "SAS",
            Sata => "SATA",
            Sd => "SD",
            Mmc => "MMC",
            Virtual => "Virtual",
            FileBackedVirtual => "FileBacked",
            Spaces => "Spaces",
            Nvme => "NVMe",
            Scm => "SCM",
            Ufs => "UFS",
            NvmeOf => "NVMe-oF",
            Other(_) => "Other",
        }
    }
}

impl fmt::Display for StorageBusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBusType::Other(raw) => write!(f, "Other({raw:#x})"),
            known => f.write_str(known.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BusVersion {
    pub major: u16,
    pub minor: u16,
}

impl fmt::Display for BusVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StorageAdapterInfo {
    pub device_number: u32,
    pub bus_type: StorageBusType,
    pub accelerated_transfer: bool,
    pub adapter_scans_down: bool,
    pub adapter_uses_programmed_io: bool,
    pub bus_version: BusVersion,
    pub command_queueing: bool,
    pub maximum_transfer_bytes: u32,
    /// Empty unless the opener can look one up; always empty with `Win32Opener`.
    pub bus_reported_description: String,
}

impl StorageAdapterInfo {
    /// Compares everything but `device_number`, i.e. whether two disks sit
    /// behind adapters with the same characteristics.
    pub fn same_adapter(&self, other: &Self) -> bool {
        self.bus_type == other.bus_type
            && self.accelerated_transfer == other.accelerated_transfer
            && self.adapter_scans_down == other.adapter_scans_down
            && self.adapter_uses_programmed_io == other.adapter_uses_programmed_io
            && self.bus_version == other.bus_version
            && self.command_queueing == other.command_queueing
            && self.maximum_transfer_bytes == other.maximum_transfer_bytes
            && self.bus_reported_description == other.bus_reported_description
    }
}

// Full structural equality: every field, device number included.
impl PartialEq for StorageAdapterInfo {
    fn eq(&self, other: &Self) -> bool {
        self.device_number == other.device_number && self.same_adapter(other)
    }
}

impl Eq for StorageAdapterInfo {}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StorageDeviceInfo {
    pub device_type: DeviceType,
    pub bus_type: StorageBusType,
    pub device_number: u32,
    pub partition_number: i32,
    pub product_id: String,
    pub product_revision: String,
    pub vendor_id: String,
    pub serial_number: String,
    pub removable_media: bool,
    pub command_queueing: bool,
    /// Zero unless the caller is elevated.
    pub total_size: i64,
}

impl PartialEq for StorageDeviceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.device_type == other.device_type
            && self.bus_type == other.bus_type
            && self.device_number == other.device_number
            && self.partition_number == other.partition_number
            && self.product_id == other.product_id
            && self.product_revision == other.product_revision
            && self.vendor_id == other.vendor_id
            && self.serial_number == other.serial_number
            && self.removable_media == other.removable_media
            && self.command_queueing == other.command_queueing
            && self.total_size == other.total_size
    }
}

impl Eq for StorageDeviceInfo {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PartitionStyle {
    Mbr,
    Gpt,
    Raw,
}

impl PartitionStyle {
    /// PARTITION_STYLE; anything unrecognised is treated as raw.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => PartitionStyle::Mbr,
            1 => PartitionStyle::Gpt,
            _ => PartitionStyle::Raw,
        }
    }
}

/// MEDIA_TYPE from the disk geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MediaType {
    Unknown,
    RemovableMedia,
    FixedMedia,
    /// One of the floppy formats.
    Floppy(u32),
    Other(u32),
}

impl MediaType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => MediaType::Unknown,
            11 => MediaType::RemovableMedia,
            12 => MediaType::FixedMedia,
            1..=10 | 13..=25 => MediaType::Floppy(raw),
            other => MediaType::Other(other),
        }
    }
}

/// Named GPT partition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GptPartitionType {
    Unused,
    EfiSystem,
    MicrosoftReserved,
    BasicData,
    LdmMetadata,
    LdmData,
    MicrosoftRecovery,
    StorageSpaces,
    StorageReplica,
    MbrPartitionScheme,
    BiosBoot,
    LinuxFilesystem,
    LinuxSwap,
    LinuxLvm,
    LinuxRaid,
    AppleHfsPlus,
    AppleApfs,
    Unknown,
}

impl GptPartitionType {
    pub fn is_ldm(self) -> bool {
        matches!(self, GptPartitionType::LdmData | GptPartitionType::LdmMetadata)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GptPartitionInfo {
    pub starting_offset: i64,
    pub partition_length: i64,
    pub partition_number: u32,
    pub rewrite_partition: bool,
    pub is_service_partition: bool,
    pub partition_type: GptPartitionType,
    pub partition_type_id: Uuid,
    pub partition_id: Uuid,
    pub attributes: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MbrPartitionInfo {
    pub starting_offset: i64,
    pub partition_length: i64,
    pub partition_number: u32,
    pub rewrite_partition: bool,
    pub is_service_partition: bool,
    pub partition_type: u8,
    pub boot_indicator: bool,
    pub recognized_partition: bool,
    pub hidden_sectors: u32,
    pub partition_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GptLayout {
    pub disk_id: Uuid,
    pub max_partition_count: u32,
    pub starting_usable_offset: i64,
    pub usable_length: i64,
    pub partitions: Vec<GptPartitionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MbrLayout {
    pub signature: u32,
    pub checksum: u32,
    /// Slot count as the OS reported it, unused slots included.
    pub reported_slot_count: u32,
    pub partitions: Vec<MbrPartitionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PartitionLayout {
    Raw,
    Mbr(MbrLayout),
    Gpt(GptLayout),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StoragePartitionInfo {
    pub device_number: u32,
    pub partition_style: PartitionStyle,
    /// For MBR this counts used slots only.
    pub partition_count: u32,
    pub media_type: MediaType,
    pub bytes_per_sector: u32,
    pub total_size: i64,
    pub is_on_dynamic_disk: bool,
    pub layout: PartitionLayout,
}

impl StoragePartitionInfo {
    pub fn gpt(&self) -> Option<&GptLayout> {
        match &self.layout {
            PartitionLayout::Gpt(gpt) => Some(gpt),
            _ => None,
        }
    }

    pub fn mbr(&self) -> Option<&MbrLayout> {
        match &self.layout {
            PartitionLayout::Mbr(mbr) => Some(mbr),
            _ => None,
        }
    }
}

/// One physical-disk region backing a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DiskExtent {
    pub disk_number: u32,
    pub starting_offset: i64,
    pub length: i64,
}

/// Adapter, device and partition data for one resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StorageInfo {
    pub identity: DeviceIdentity,
    pub local_device_path: String,
    pub adapter: Option<StorageAdapterInfo>,
    pub device: StorageDeviceInfo,
    pub partition: Option<StoragePartitionInfo>,
}
