//! Native block-device discovery via udev.
//!
//! One pass over the `block` subsystem: disks first, then partitions
//! attached to their parent disk. Enrichment this adapter can supply: a
//! media hint from the `queue/rotational` sysattr, a filesystem label from
//! `ID_FS_LABEL`, and mount points resolved through `/proc/mounts`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::catalog::{DiscoveryAdapter, DiskProbe, MediaType, PartitionProbe};

const SECTOR_SIZE: u64 = 512;

pub struct LinuxAdapter;

impl LinuxAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryAdapter for LinuxAdapter {
    fn enumerate(&self) -> Result<Vec<DiskProbe>> {
        let mounts = read_mount_table().context("Failed to read mount table")?;

        let mut enumerator =
            udev::Enumerator::new().context("Failed to create udev enumerator")?;
        enumerator
            .match_subsystem("block")
            .context("Failed to filter block subsystem")?;
        let devices: Vec<udev::Device> = enumerator
            .scan_devices()
            .context("Failed to scan block devices")?
            .collect();

        // Disks first so partitions can attach by parent syspath.
        let mut disk_index: HashMap<PathBuf, usize> = HashMap::new();
        let mut entries: Vec<(String, DiskProbe)> = Vec::new();

        for device in &devices {
            if device.devtype() != Some(OsStr::new("disk")) {
                continue;
            }

            let sysname = device.sysname().to_string_lossy().to_string();
            let model = device
                .property_value("ID_MODEL")
                .map(|v| v.to_string_lossy().replace('_', " "))
                .unwrap_or_else(|| sysname.clone());
            let serial = device
                .property_value("ID_SERIAL_SHORT")
                .map(|v| v.to_string_lossy().to_string());
            let media = match device
                .attribute_value("queue/rotational")
                .map(|v| v.to_string_lossy().to_string())
                .as_deref()
            {
                Some("0") => Some(MediaType::Ssd),
                Some("1") => Some(MediaType::Hdd),
                _ => None,
            };

            disk_index.insert(device.syspath().to_path_buf(), entries.len());
            entries.push((
                sysname,
                DiskProbe {
                    model,
                    serial,
                    size_bytes: sector_count(device) * SECTOR_SIZE,
                    media,
                    partitions: Vec::new(),
                },
            ));
        }

        for device in &devices {
            if device.devtype() != Some(OsStr::new("partition")) {
                continue;
            }

            let Some(parent) = device.parent() else {
                debug!(
                    device = %device.sysname().to_string_lossy(),
                    "Partition without parent disk, skipping"
                );
                continue;
            };
            let Some(&index) = disk_index.get(parent.syspath()) else {
                continue;
            };

            let name = device.sysname().to_string_lossy().to_string();
            let devnode = device
                .devnode()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("/dev/{name}"));

            entries[index].1.partitions.push(PartitionProbe {
                mount_point: mounts.get(&devnode).cloned(),
                device: devnode,
                name,
                size_bytes: sector_count(device) * SECTOR_SIZE,
                drive_letter: None,
                volume_label: device
                    .property_value("ID_FS_LABEL")
                    .map(|v| v.to_string_lossy().to_string()),
            });
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut disks: Vec<DiskProbe> = entries.into_iter().map(|(_, disk)| disk).collect();
        for disk in &mut disks {
            disk.partitions.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(disks)
    }
}

fn sector_count(device: &udev::Device) -> u64 {
    device
        .attribute_value("size")
        .and_then(|v| v.to_string_lossy().parse().ok())
        .unwrap_or(0)
}

/// Device node -> mount point, from /proc/mounts. Octal escapes in mount
/// paths (spaces, tabs) are decoded.
fn read_mount_table() -> Result<HashMap<String, PathBuf>> {
    let raw = fs::read_to_string("/proc/mounts")?;
    let mut table = HashMap::new();

    for line in raw.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(mount_point)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !device.starts_with("/dev/") {
            continue;
        }
        table
            .entry(device.to_string())
            .or_insert_with(|| PathBuf::from(unescape_mount_path(mount_point)));
    }

    Ok(table)
}

fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_path_escapes_are_decoded() {
        assert_eq!(unescape_mount_path("/mnt/usb"), "/mnt/usb");
        assert_eq!(
            unescape_mount_path("/mnt/my\\040drive"),
            "/mnt/my drive"
        );
    }

    #[test]
    fn mount_table_is_readable() {
        let table = read_mount_table().unwrap();
        for mount_point in table.values() {
            assert!(mount_point.is_absolute());
        }
    }
}
