//! In-memory discovery adapter for tests and `--simulation` runs.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use crate::core::catalog::{DiscoveryAdapter, DiskProbe, MediaType, PartitionProbe};

struct SimulatedState {
    disks: Vec<DiskProbe>,
    fail_next: bool,
}

/// Injection handle paired with a `SimulatedAdapter`. Mutations are seen by
/// the adapter's next enumeration pass.
#[derive(Clone)]
pub struct SimulatorControl {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatorControl {
    pub fn add_disk(&self, model: &str, size_bytes: u64) {
        let mut state = self.state.lock().expect("simulator state poisoned");
        let serial_index = state.disks.len();
        state.disks.push(DiskProbe {
            model: model.to_string(),
            serial: Some(format!("SIM{:04}", serial_index)),
            size_bytes,
            media: Some(MediaType::Ssd),
            partitions: Vec::new(),
        });
    }

    /// Attach a partition to the disk with the given model.
    pub fn add_partition(
        &self,
        disk_model: &str,
        name: &str,
        size_bytes: u64,
        mount_point: Option<PathBuf>,
    ) {
        let mut state = self.state.lock().expect("simulator state poisoned");
        if let Some(disk) = state.disks.iter_mut().find(|d| d.model == disk_model) {
            disk.partitions.push(PartitionProbe {
                device: format!("/dev/sim/{name}"),
                name: name.to_string(),
                size_bytes,
                mount_point,
                drive_letter: None,
                volume_label: None,
            });
        }
    }

    /// Make the next enumeration pass fail, to exercise the all-or-nothing
    /// refresh contract.
    pub fn fail_next_refresh(&self) {
        self.state
            .lock()
            .expect("simulator state poisoned")
            .fail_next = true;
    }
}

pub struct SimulatedAdapter {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedAdapter {
    pub fn new() -> (Self, SimulatorControl) {
        let state = Arc::new(Mutex::new(SimulatedState {
            disks: Vec::new(),
            fail_next: false,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            SimulatorControl { state },
        )
    }

    /// One pre-seeded disk with a partition mounted at the system temp
    /// directory, so a simulated wipe run exercises the real walk without
    /// touching real devices.
    pub fn with_fixture() -> Self {
        let (adapter, control) = Self::new();
        control.add_disk("WIPR Simulated Disk", 64 * 1024 * 1024 * 1024);
        control.add_partition(
            "WIPR Simulated Disk",
            "sim0",
            2 * 1024 * 1024 * 1024,
            Some(std::env::temp_dir()),
        );
        adapter
    }
}

impl DiscoveryAdapter for SimulatedAdapter {
    fn enumerate(&self) -> anyhow::Result<Vec<DiskProbe>> {
        let mut state = self.state.lock().expect("simulator state poisoned");
        if state.fail_next {
            state.fail_next = false;
            return Err(anyhow!("simulated enumeration failure"));
        }
        Ok(state.disks.clone())
    }
}
