//! Windows discovery via WMI.
//!
//! Five queries are cross-referenced to build the disk/partition view:
//! `Win32_DiskDrive` (fixed media only), `Win32_DiskPartition`,
//! `Win32_LogicalDiskToPartition`, `Win32_LogicalDisk`, and
//! `MSFT_PhysicalDisk` from the storage namespace for the SSD/HDD hint
//! (media type 4 is SSD, 3 is HDD, matched by serial number).

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use windows::Win32::System::Com::{
    CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, CoCreateInstance, CoInitializeEx,
    CoSetProxyBlanket, EOAC_NONE, RPC_C_AUTHN_LEVEL_CALL, RPC_C_IMP_LEVEL_IMPERSONATE,
};
use windows::Win32::System::Rpc::{RPC_C_AUTHN_WINNT, RPC_C_AUTHZ_NONE};
use windows::Win32::System::Wmi::{
    IEnumWbemClassObject, IWbemLocator, IWbemServices, WBEM_FLAG_FORWARD_ONLY,
    WBEM_FLAG_RETURN_IMMEDIATELY, WBEM_INFINITE, WbemLocator,
};
use windows::core::{BSTR, PCWSTR, VARIANT};

use crate::core::catalog::{DiscoveryAdapter, DiskProbe, MediaType, PartitionProbe};

const CIM_NAMESPACE: &str = r"ROOT\CIMV2";
const STORAGE_NAMESPACE: &str = r"ROOT\Microsoft\Windows\Storage";

struct RawDrive {
    device_id: String,
    model: String,
    serial: String,
    size_bytes: u64,
    index: u32,
}

struct RawPartition {
    device_id: String,
    disk_index: u32,
    size_bytes: u64,
    name: String,
}

struct RawMapping {
    antecedent: String,
    dependent: String,
}

struct RawLogicalDisk {
    device_id: String,
    volume_name: Option<String>,
}

struct RawPhysicalDisk {
    serial: String,
    media_type: u16,
}

pub struct WindowsAdapter;

impl WindowsAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryAdapter for WindowsAdapter {
    fn enumerate(&self) -> Result<Vec<DiskProbe>> {
        let cim = WmiConnection::open(CIM_NAMESPACE)?;
        let storage = WmiConnection::open(STORAGE_NAMESPACE)?;

        let drives = query_drives(&cim)?;
        let partitions = query_partitions(&cim)?;
        let mappings = query_mappings(&cim)?;
        let logical_disks = query_logical_disks(&cim)?;
        let physical_disks = query_physical_disks(&storage)?;

        let mut probes = Vec::with_capacity(drives.len());
        for drive in &drives {
            let media = physical_disks
                .iter()
                .find(|pd| pd.serial.trim().eq_ignore_ascii_case(drive.serial.trim()))
                .and_then(|pd| match pd.media_type {
                    4 => Some(MediaType::Ssd),
                    3 => Some(MediaType::Hdd),
                    _ => None,
                });

            let mut parts = Vec::new();
            for partition in partitions.iter().filter(|p| p.disk_index == drive.index) {
                for mapping in mappings
                    .iter()
                    .filter(|m| m.antecedent.contains(&partition.device_id))
                {
                    let Some(letter) = extract_drive_letter(&mapping.dependent) else {
                        continue;
                    };
                    let volume_label = logical_disks
                        .iter()
                        .find(|ld| ld.device_id == letter)
                        .and_then(|ld| ld.volume_name.clone());

                    parts.push(PartitionProbe {
                        device: partition.device_id.clone(),
                        name: partition.name.clone(),
                        size_bytes: partition.size_bytes,
                        mount_point: Some(PathBuf::from(format!("{letter}\\"))),
                        drive_letter: Some(letter),
                        volume_label,
                    });
                }
            }

            probes.push(DiskProbe {
                model: drive.model.clone(),
                serial: Some(drive.serial.clone()),
                size_bytes: drive.size_bytes,
                media,
                partitions: parts,
            });
        }

        Ok(probes)
    }
}

fn query_drives(conn: &WmiConnection) -> Result<Vec<RawDrive>> {
    conn.query(
        "SELECT DeviceID, Model, SerialNumber, Size, Index FROM Win32_DiskDrive \
         WHERE MediaType='Fixed hard disk media'",
        |row| {
            Ok(RawDrive {
                device_id: row.string("DeviceID")?,
                model: row.string("Model")?,
                serial: row.string("SerialNumber").unwrap_or_default(),
                size_bytes: row.u64("Size")?,
                index: row.u64("Index")? as u32,
            })
        },
    )
}

fn query_partitions(conn: &WmiConnection) -> Result<Vec<RawPartition>> {
    conn.query(
        "SELECT DeviceID, DiskIndex, Size, Name FROM Win32_DiskPartition \
         WHERE Size >= 1073741824",
        |row| {
            Ok(RawPartition {
                device_id: row.string("DeviceID")?,
                disk_index: row.u64("DiskIndex")? as u32,
                size_bytes: row.u64("Size")?,
                name: row.string("Name")?,
            })
        },
    )
}

fn query_mappings(conn: &WmiConnection) -> Result<Vec<RawMapping>> {
    conn.query(
        "SELECT Antecedent, Dependent FROM Win32_LogicalDiskToPartition",
        |row| {
            Ok(RawMapping {
                antecedent: row.string("Antecedent")?,
                dependent: row.string("Dependent")?,
            })
        },
    )
}

fn query_logical_disks(conn: &WmiConnection) -> Result<Vec<RawLogicalDisk>> {
    conn.query("SELECT DeviceID, VolumeName FROM Win32_LogicalDisk", |row| {
        Ok(RawLogicalDisk {
            device_id: row.string("DeviceID")?,
            volume_name: row.string("VolumeName").ok(),
        })
    })
}

fn query_physical_disks(conn: &WmiConnection) -> Result<Vec<RawPhysicalDisk>> {
    conn.query(
        "SELECT FriendlyName, SerialNumber, MediaType FROM MSFT_PhysicalDisk",
        |row| {
            Ok(RawPhysicalDisk {
                serial: row.string("SerialNumber").unwrap_or_default(),
                media_type: row.u64("MediaType")? as u16,
            })
        },
    )
}

/// `Dependent` references look like
/// `\\HOST\root\cimv2:Win32_LogicalDisk.DeviceID="C:"`.
fn extract_drive_letter(dependent: &str) -> Option<String> {
    const MARKER: &str = "Win32_LogicalDisk.DeviceID=\"";
    let start = dependent.find(MARKER)? + MARKER.len();
    let rest = &dependent[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

struct WmiConnection {
    services: IWbemServices,
}

impl WmiConnection {
    fn open(namespace: &str) -> Result<Self> {
        unsafe {
            // Repeated initialization on an already-initialized thread
            // returns S_FALSE, which is fine.
            let _ = CoInitializeEx(None, COINIT_MULTITHREADED);

            let locator: IWbemLocator = CoCreateInstance(&WbemLocator, None, CLSCTX_INPROC_SERVER)
                .context("Failed to create WMI locator")?;

            let services = locator
                .ConnectServer(
                    &BSTR::from(namespace),
                    &BSTR::new(),
                    &BSTR::new(),
                    &BSTR::new(),
                    0,
                    &BSTR::new(),
                    None,
                )
                .with_context(|| format!("Failed to connect to WMI namespace {namespace}"))?;

            CoSetProxyBlanket(
                &services,
                RPC_C_AUTHN_WINNT,
                RPC_C_AUTHZ_NONE,
                None,
                RPC_C_AUTHN_LEVEL_CALL,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                None,
                EOAC_NONE,
            )
            .context("Failed to set WMI proxy blanket")?;

            Ok(Self { services })
        }
    }

    fn query<T>(&self, wql: &str, map: impl Fn(&WmiRow) -> Result<T>) -> Result<Vec<T>> {
        unsafe {
            let enumerator: IEnumWbemClassObject = self
                .services
                .ExecQuery(
                    &BSTR::from("WQL"),
                    &BSTR::from(wql),
                    WBEM_FLAG_FORWARD_ONLY | WBEM_FLAG_RETURN_IMMEDIATELY,
                    None,
                )
                .with_context(|| format!("WMI query failed: {wql}"))?;

            let mut rows = Vec::new();
            loop {
                let mut objects = [None];
                let mut returned = 0u32;
                enumerator
                    .Next(WBEM_INFINITE, &mut objects, &mut returned)
                    .ok()
                    .with_context(|| format!("WMI enumeration failed: {wql}"))?;
                if returned == 0 {
                    break;
                }
                let Some(object) = objects[0].take() else {
                    break;
                };
                rows.push(map(&WmiRow { object })?);
            }
            Ok(rows)
        }
    }
}

struct WmiRow {
    object: windows::Win32::System::Wmi::IWbemClassObject,
}

impl WmiRow {
    fn string(&self, property: &str) -> Result<String> {
        let value = self.raw(property)?;
        let text = value.to_string();
        if text.is_empty() {
            return Err(anyhow!("WMI property {property} is empty"));
        }
        Ok(text)
    }

    /// WMI surfaces 64-bit integers as strings and smaller ones as
    /// numeric variants; the display form parses for both.
    fn u64(&self, property: &str) -> Result<u64> {
        let value = self.raw(property)?;
        value
            .to_string()
            .trim()
            .parse()
            .with_context(|| format!("WMI property {property} is not numeric"))
    }

    fn raw(&self, property: &str) -> Result<VARIANT> {
        let name: Vec<u16> = property.encode_utf16().chain(std::iter::once(0)).collect();
        let mut value = VARIANT::default();
        unsafe {
            self.object
                .Get(PCWSTR(name.as_ptr()), 0, &mut value, None, None)
                .with_context(|| format!("Failed to read WMI property {property}"))?;
        }
        Ok(value)
    }
}

/// Null-terminated UTF-16 for Win32 string parameters.
pub(crate) fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
