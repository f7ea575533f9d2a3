//! Device discovery and the normalized disk/partition model.
//!
//! Per-platform adapters hand the catalog raw probe records; normalization
//! drops sub-threshold partitions, assigns generated identifiers, and
//! produces an immutable snapshot. A refresh is all-or-nothing: any failed
//! OS query aborts the pass and leaves the previous snapshot in place.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Partitions below this size are excluded from discovery unconditionally.
pub const MIN_PARTITION_BYTES: u64 = 1_073_741_824;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaType {
    Ssd,
    Hdd,
}

/// Raw per-disk record produced by a platform adapter, before
/// normalization. Enrichment fields are optional; adapters supply what
/// their platform can answer and nothing more.
#[derive(Debug, Clone)]
pub struct DiskProbe {
    pub model: String,
    pub serial: Option<String>,
    pub size_bytes: u64,
    pub media: Option<MediaType>,
    pub partitions: Vec<PartitionProbe>,
}

#[derive(Debug, Clone)]
pub struct PartitionProbe {
    pub device: String,
    pub name: String,
    pub size_bytes: u64,
    pub mount_point: Option<PathBuf>,
    pub drive_letter: Option<String>,
    pub volume_label: Option<String>,
}

/// One enumeration pass over the platform's block devices.
///
/// Implementations perform blocking OS queries and must treat the pass as
/// a unit: a partial result is an error, not a shorter list.
pub trait DiscoveryAdapter: Send + Sync {
    fn enumerate(&self) -> anyhow::Result<Vec<DiskProbe>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Disk {
    pub id: String,
    pub model: String,
    pub serial: Option<String>,
    pub size_bytes: u64,
    pub media: Option<MediaType>,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Partition {
    pub id: String,
    pub disk_id: String,
    pub device: String,
    pub name: String,
    pub size_bytes: u64,
    pub mount_point: Option<PathBuf>,
    pub drive_letter: Option<String>,
    pub volume_label: Option<String>,
    /// The historical `"name model"` display key. Not guaranteed unique
    /// across identically modeled disks; resolution by this key is
    /// first-match-wins.
    pub legacy_key: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("drive discovery failed: {0}")]
    Discovery(anyhow::Error),
    #[error("no disk or partition matches key '{0}'")]
    NotFound(String),
}

/// Immutable result of one catalog refresh. A new refresh produces a
/// wholly new snapshot; existing snapshots are never mutated.
pub struct CatalogSnapshot {
    disks: Vec<Disk>,
    by_partition_id: HashMap<String, (usize, usize)>,
}

impl CatalogSnapshot {
    fn build(probes: Vec<DiskProbe>) -> Self {
        let mut disks = Vec::with_capacity(probes.len());
        let mut by_partition_id = HashMap::new();

        for (disk_idx, probe) in probes.into_iter().enumerate() {
            let disk_id = format!("d{disk_idx}");
            let mut partitions = Vec::new();

            for part in probe.partitions {
                if part.size_bytes < MIN_PARTITION_BYTES {
                    debug!(
                        device = %part.device,
                        size_bytes = part.size_bytes,
                        "Dropping partition below minimum reportable size"
                    );
                    continue;
                }

                let part_idx = partitions.len();
                let id = format!("{disk_id}p{part_idx}");
                by_partition_id.insert(id.clone(), (disk_idx, part_idx));
                partitions.push(Partition {
                    id,
                    disk_id: disk_id.clone(),
                    device: part.device,
                    legacy_key: format!("{} {}", part.name, probe.model),
                    name: part.name,
                    size_bytes: part.size_bytes,
                    mount_point: part.mount_point,
                    drive_letter: part.drive_letter,
                    volume_label: part.volume_label,
                });
            }

            disks.push(Disk {
                id: disk_id,
                model: probe.model,
                serial: probe.serial,
                size_bytes: probe.size_bytes,
                media: probe.media,
                partitions,
            });
        }

        Self {
            disks,
            by_partition_id,
        }
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn disk(&self, id: &str) -> Option<&Disk> {
        self.disks.iter().find(|d| d.id == id)
    }

    /// Look up a partition by generated id, falling back to the legacy
    /// `"name model"` key (first match wins).
    pub fn partition(&self, key: &str) -> Option<&Partition> {
        if let Some(&(disk_idx, part_idx)) = self.by_partition_id.get(key) {
            return Some(&self.disks[disk_idx].partitions[part_idx]);
        }
        self.disks
            .iter()
            .flat_map(|d| d.partitions.iter())
            .find(|p| p.legacy_key == key)
    }
}

/// Discovery facade: owns the platform adapter and publishes immutable
/// snapshots.
pub struct DriveCatalog {
    adapter: Box<dyn DiscoveryAdapter>,
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
}

impl DriveCatalog {
    pub fn new(adapter: Box<dyn DiscoveryAdapter>) -> Self {
        Self {
            adapter,
            current: RwLock::new(None),
        }
    }

    /// Run one enumeration pass. On success the new snapshot replaces the
    /// published one; on failure the published snapshot is left untouched.
    pub fn refresh(&self) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let probes = self
            .adapter
            .enumerate()
            .map_err(CatalogError::Discovery)?;

        let snapshot = Arc::new(CatalogSnapshot::build(probes));
        *self.current.write().expect("catalog lock poisoned") = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// The most recently published snapshot, if any refresh has succeeded.
    pub fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.read().expect("catalog lock poisoned").clone()
    }

    /// Resolve a single partition against the published snapshot.
    pub fn resolve_by_key(&self, key: &str) -> Result<Partition, CatalogError> {
        self.snapshot()
            .as_deref()
            .and_then(|snap| snap.partition(key).cloned())
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))
    }

    /// Resolve a wipe target: a partition key yields that partition, a
    /// disk id yields every partition of that disk.
    pub fn resolve_targets(&self, key: &str) -> Result<Vec<Partition>, CatalogError> {
        let snapshot = self
            .snapshot()
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))?;

        if let Some(partition) = snapshot.partition(key) {
            return Ok(vec![partition.clone()]);
        }
        if let Some(disk) = snapshot.disk(key) {
            return Ok(disk.partitions.clone());
        }
        Err(CatalogError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(model: &str, parts: Vec<PartitionProbe>) -> DiskProbe {
        DiskProbe {
            model: model.to_string(),
            serial: None,
            size_bytes: 500 * MIN_PARTITION_BYTES,
            media: None,
            partitions: parts,
        }
    }

    fn part(name: &str, size_bytes: u64) -> PartitionProbe {
        PartitionProbe {
            device: format!("/dev/{name}"),
            name: name.to_string(),
            size_bytes,
            mount_point: None,
            drive_letter: None,
            volume_label: None,
        }
    }

    #[test]
    fn normalization_drops_sub_threshold_partitions() {
        let snapshot = CatalogSnapshot::build(vec![probe(
            "WD Blue",
            vec![
                part("sda1", 512 * 1024 * 1024),
                part("sda2", 2 * MIN_PARTITION_BYTES),
            ],
        )]);

        let disk = &snapshot.disks()[0];
        assert_eq!(disk.partitions.len(), 1);
        assert_eq!(disk.partitions[0].name, "sda2");
        assert_eq!(disk.partitions[0].id, "d0p0");
    }

    #[test]
    fn generated_ids_and_legacy_keys_both_resolve() {
        let snapshot = CatalogSnapshot::build(vec![probe(
            "WD Blue",
            vec![part("sda1", 2 * MIN_PARTITION_BYTES)],
        )]);

        assert!(snapshot.partition("d0p0").is_some());
        assert!(snapshot.partition("sda1 WD Blue").is_some());
        assert!(snapshot.partition("sda9 WD Blue").is_none());
    }

    #[test]
    fn legacy_key_collisions_resolve_to_first_match() {
        let snapshot = CatalogSnapshot::build(vec![
            probe("Samsung 870", vec![part("part1", 2 * MIN_PARTITION_BYTES)]),
            probe("Samsung 870", vec![part("part1", 4 * MIN_PARTITION_BYTES)]),
        ]);

        let hit = snapshot.partition("part1 Samsung 870").unwrap();
        assert_eq!(hit.disk_id, "d0");
    }

    #[test]
    fn every_partition_references_its_owning_disk() {
        let snapshot = CatalogSnapshot::build(vec![
            probe("A", vec![part("a1", 2 * MIN_PARTITION_BYTES)]),
            probe(
                "B",
                vec![
                    part("b1", 2 * MIN_PARTITION_BYTES),
                    part("b2", 3 * MIN_PARTITION_BYTES),
                ],
            ),
        ]);

        for disk in snapshot.disks() {
            for partition in &disk.partitions {
                assert_eq!(partition.disk_id, disk.id);
                assert!(snapshot.disk(&partition.disk_id).is_some());
            }
        }
    }
}
