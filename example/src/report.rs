//! Human-readable output.

use win_disktopo::types::{DiskExtent, PartitionLayout, StorageInfo};

const MIB: i64 = 1024 * 1024;

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

pub fn print_disks(disks: &[StorageInfo]) {
    println!("=== {} disk(s) ===", disks.len());
    for info in disks {
        print_info(info);
        println!();
    }
}

pub fn print_info(info: &StorageInfo) {
    let device = &info.device;
    println!(
        "Disk {} ({}), partition {}",
        device.device_number, info.local_device_path, device.partition_number
    );
    println!(
        "  Device: {} {} rev {} serial {} [{:?}, {}]",
        or_dash(&device.vendor_id),
        or_dash(&device.product_id),
        or_dash(&device.product_revision),
        or_dash(&device.serial_number),
        device.device_type,
        device.bus_type
    );
    if device.removable_media {
        println!("  Removable media");
    }
    if device.total_size > 0 {
        println!("  Size: {} MB", device.total_size / MIB);
    }

    match &info.adapter {
        Some(adapter) => println!(
            "  Adapter: {} {} max transfer {} bytes{}",
            adapter.bus_type,
            adapter.bus_version,
            adapter.maximum_transfer_bytes,
            if adapter.bus_reported_description.is_empty() {
                String::new()
            } else {
                format!(" ({})", adapter.bus_reported_description)
            }
        ),
        None => println!("  Adapter: unavailable"),
    }

    let Some(partition) = &info.partition else {
        println!("  No partition table");
        return;
    };
    println!(
        "  {:?} table, {} partition(s), {} MB, {} bytes/sector, {:?}{}",
        partition.partition_style,
        partition.partition_count,
        partition.total_size / MIB,
        partition.bytes_per_sector,
        partition.media_type,
        if partition.is_on_dynamic_disk {
            ", dynamic"
        } else {
            ""
        }
    );
    match &partition.layout {
        PartitionLayout::Gpt(gpt) => {
            println!("    Disk ID: {}", gpt.disk_id);
            for p in &gpt.partitions {
                println!(
                    "    Partition {}: {} MB at {} [{:?}] {}",
                    p.partition_number,
                    p.partition_length / MIB,
                    p.starting_offset,
                    p.partition_type,
                    or_dash(&p.name)
                );
            }
        }
        PartitionLayout::Mbr(mbr) => {
            println!("    Signature: {:08X}", mbr.signature);
            for p in &mbr.partitions {
                println!(
                    "    Partition {}: {} MB at {} [type {:#04x}{}]",
                    p.partition_number,
                    p.partition_length / MIB,
                    p.starting_offset,
                    p.partition_type,
                    if p.boot_indicator { ", boot" } else { "" }
                );
            }
        }
        PartitionLayout::Raw => {}
    }
}

pub fn print_extents(extents: &[DiskExtent]) {
    if extents.len() < 2 {
        return;
    }
    println!("  Volume spans {} extents:", extents.len());
    for extent in extents {
        println!(
            "    Disk {}: {} MB at {}",
            extent.disk_number,
            extent.length / MIB,
            extent.starting_offset
        );
    }
}
