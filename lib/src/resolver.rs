use log::{debug, warn};

use crate::descriptor;
use crate::device::{Access, DeviceOpener};
use crate::error::Result;
use crate::extents;
use crate::ioctl::DEFAULT_MAX_BUFFER_DOUBLINGS;
use crate::number::{self, Located};
use crate::partition;
use crate::path::ClassifiedPath;
use crate::types::{
    DiskExtent, StorageAdapterInfo, StorageDeviceInfo, StorageInfo, StoragePartitionInfo,
};

/// Outcome of resolving a target that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Resolved(T),
    /// An ordinal was requested and no disk answers to it.
    NotFound,
    /// The device exposes no device number at all.
    Unsupported,
    /// Independently read device numbers disagree.
    Inconsistent,
}

impl<T> Lookup<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            Lookup::Resolved(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Lookup::Resolved(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Resolved(value) => Lookup::Resolved(f(value)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Unsupported => Lookup::Unsupported,
            Lookup::Inconsistent => Lookup::Inconsistent,
        }
    }
}

/// What a caller asks about: a path in any accepted form, or a physical
/// disk ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Path(String),
    Ordinal(u32),
}

impl From<&str> for Target {
    fn from(path: &str) -> Self {
        Target::Path(path.to_owned())
    }
}

impl From<String> for Target {
    fn from(path: String) -> Self {
        Target::Path(path)
    }
}

impl From<u32> for Target {
    fn from(ordinal: u32) -> Self {
        Target::Ordinal(ordinal)
    }
}

impl Target {
    fn classify(&self) -> Result<(ClassifiedPath, Option<u32>)> {
        match self {
            Target::Path(path) => Ok((ClassifiedPath::classify(path)?, None)),
            Target::Ordinal(ordinal) => {
                Ok((ClassifiedPath::physical_drive(*ordinal), Some(*ordinal)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// How many times a query buffer may double before giving up.
    pub max_buffer_doublings: u32,
    /// Partition entries the first drive layout query makes room for.
    pub layout_partition_capacity: usize,
    pub adapter_buffer_size: usize,
    /// First guess for the device descriptor, which carries strings.
    pub device_descriptor_size: usize,
    /// Ordinals tried by [`StorageResolver::list_disks`].
    pub max_disk_ordinal: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_buffer_doublings: DEFAULT_MAX_BUFFER_DOUBLINGS,
            layout_partition_capacity: 128,
            adapter_buffer_size: 1024,
            device_descriptor_size: 1024,
            max_disk_ordinal: 64,
        }
    }
}

/// Resolves storage targets to their disk, adapter and partition table.
///
/// Every call opens its own devices and drops them before returning, so a
/// resolver can be shared between threads as long as its opener can.
#[derive(Debug, Clone)]
pub struct StorageResolver<O> {
    opener: O,
    config: ResolverConfig,
}

impl<O: DeviceOpener> StorageResolver<O> {
    pub fn new(opener: O) -> Self {
        Self::with_config(opener, ResolverConfig::default())
    }

    pub fn with_config(opener: O, config: ResolverConfig) -> Self {
        Self { opener, config }
    }

    fn elevation(&self, elevated: Option<bool>) -> bool {
        elevated.unwrap_or_else(|| self.opener.is_elevated())
    }

    fn with_located<T>(
        &self,
        target: &Target,
        elevated: bool,
        read: impl FnOnce(Located<O::Device>) -> Result<T>,
    ) -> Result<Lookup<T>> {
        let (path, wanted) = target.classify()?;
        let located = number::locate(
            &self.opener,
            &path,
            wanted,
            Access::for_caller(elevated),
            self.config.max_buffer_doublings,
        )?;
        match located {
            Lookup::Resolved(located) => read(located).map(Lookup::Resolved),
            Lookup::NotFound => Ok(Lookup::NotFound),
            Lookup::Unsupported => Ok(Lookup::Unsupported),
            Lookup::Inconsistent => Ok(Lookup::Inconsistent),
        }
    }

    fn read_device(&self, target: &Target, elevated: bool) -> Result<Lookup<StorageInfo>> {
        self.with_located(target, elevated, |located| {
            let device = descriptor::read_device(
                &located.device,
                &located.identity,
                &located.local_device_path,
                located.named_device(),
                elevated,
                self.config.device_descriptor_size,
                self.config.max_buffer_doublings,
            )?;
            Ok(StorageInfo {
                identity: located.identity,
                local_device_path: located.local_device_path,
                adapter: None,
                device,
                partition: None,
            })
        })
    }

    fn read_adapter(
        &self,
        target: &Target,
        elevated: bool,
    ) -> Result<Lookup<Option<StorageAdapterInfo>>> {
        self.with_located(target, elevated, |located| {
            let bus_description = self
                .opener
                .bus_reported_description(&located.local_device_path);
            descriptor::read_adapter(
                &located.device,
                located.identity.device_number,
                &located.local_device_path,
                bus_description,
                self.config.adapter_buffer_size,
                self.config.max_buffer_doublings,
            )
        })
    }

    fn read_partition(
        &self,
        target: &Target,
        elevated: bool,
    ) -> Result<Lookup<Option<StoragePartitionInfo>>> {
        self.with_located(target, elevated, |located| {
            partition::read(
                &located.device,
                located.identity.device_number,
                located.identity.partition_number,
                &located.local_device_path,
                self.config.layout_partition_capacity,
                self.config.max_buffer_doublings,
            )
        })
    }

    pub fn device_info(
        &self,
        target: impl Into<Target>,
        elevated: Option<bool>,
    ) -> Result<Option<StorageDeviceInfo>> {
        let elevated = self.elevation(elevated);
        Ok(self
            .read_device(&target.into(), elevated)?
            .resolved()
            .map(|info| info.device))
    }

    pub fn adapter_info(&self, target: impl Into<Target>) -> Result<Option<StorageAdapterInfo>> {
        let elevated = self.elevation(None);
        Ok(self.read_adapter(&target.into(), elevated)?.resolved().flatten())
    }

    pub fn partition_info(
        &self,
        target: impl Into<Target>,
        elevated: Option<bool>,
    ) -> Result<Option<StoragePartitionInfo>> {
        let elevated = self.elevation(elevated);
        Ok(self
            .read_partition(&target.into(), elevated)?
            .resolved()
            .flatten())
    }

    /// All physical-disk extents of a volume, in the order the OS lists
    /// them. Non-volume targets and devices without extents give an empty
    /// list.
    pub fn disk_extents(&self, target: impl Into<Target>) -> Result<Vec<DiskExtent>> {
        let (path, _) = target.into().classify()?;
        if !path.has_volume_context() {
            return Ok(Vec::new());
        }
        let elevated = self.elevation(None);
        let device = self
            .opener
            .open(path.local_device_path(), Access::for_caller(elevated))?;
        extents::enumerate(
            &device,
            path.local_device_path(),
            self.config.max_buffer_doublings,
        )
    }

    /// Device, adapter and partition data for `target`, each read through
    /// its own device-number lookup. A composite is only returned when all
    /// of them name the same disk.
    pub fn resolve(
        &self,
        target: impl Into<Target>,
        elevated: Option<bool>,
    ) -> Result<Lookup<StorageInfo>> {
        let target = target.into();
        let elevated = self.elevation(elevated);

        let mut info = match self.read_device(&target, elevated)? {
            Lookup::Resolved(info) => info,
            other => return Ok(other),
        };
        let Lookup::Resolved(adapter) = self.read_adapter(&target, elevated)? else {
            warn!("{target:?}: device vanished between queries");
            return Ok(Lookup::Inconsistent);
        };
        let Lookup::Resolved(partition) = self.read_partition(&target, elevated)? else {
            warn!("{target:?}: device vanished between queries");
            return Ok(Lookup::Inconsistent);
        };

        let expected = info.device.device_number;
        let adapter_number = adapter.as_ref().map(|a| a.device_number);
        let partition_number = partition.as_ref().map(|p| p.device_number);
        if adapter_number.is_some_and(|n| n != expected)
            || partition_number.is_some_and(|n| n != expected)
        {
            warn!(
                "{target:?}: device number mismatch (device {expected}, adapter {adapter_number:?}, partition {partition_number:?})"
            );
            return Ok(Lookup::Inconsistent);
        }

        info.adapter = adapter;
        info.partition = partition;
        Ok(Lookup::Resolved(info))
    }

    /// Resolves physical disks by ordinal from zero, stopping at the first
    /// ordinal with no disk behind it.
    pub fn list_disks(&self, elevated: Option<bool>) -> Result<Vec<StorageInfo>> {
        let elevated = self.elevation(elevated);
        let mut disks = Vec::new();
        for ordinal in 0..self.config.max_disk_ordinal {
            match self.resolve(ordinal, Some(elevated))? {
                Lookup::Resolved(info) => disks.push(info),
                Lookup::NotFound => {
                    // Disk does not exist. Assume the end
                    break;
                }
                other => debug!("PhysicalDrive{ordinal} skipped: {other:?}"),
            }
        }
        Ok(disks)
    }
}
