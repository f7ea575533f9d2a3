//! The wipe job value object.
//!
//! A `WipeJob` is created by `WipeOrchestrator::start`, owned and mutated
//! exclusively by the worker thread, and dropped once the run has reached a
//! terminal state and been acknowledged. Counters cross the worker/consumer
//! boundary only as published copies.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::catalog::Partition;

/// Job lifecycle. `Paused` is a sub-state of running: the worker re-enters
/// `Running` from it. The orchestrator itself is `Idle` when no job exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed(_)
        )
    }
}

pub struct WipeJob {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub targets: Vec<Partition>,
    /// Sum of the target partitions' capacities; the denominator for the
    /// completion fraction.
    pub total_partition_bytes: u64,
    /// Best-effort sum of per-partition used-space probes.
    pub total_used_bytes: u64,
    pub accumulated_bytes: u64,
    pub per_partition_bytes: Vec<u64>,
    pub permission_skips: u64,
    pub current_path: Option<String>,
}

impl WipeJob {
    pub fn new(targets: Vec<Partition>, total_used_bytes: u64) -> Self {
        let total_partition_bytes = targets.iter().map(|p| p.size_bytes).sum();
        let per_partition_bytes = vec![0; targets.len()];
        Self {
            id: Uuid::now_v7(),
            started_at: Utc::now(),
            targets,
            total_partition_bytes,
            total_used_bytes,
            accumulated_bytes: 0,
            per_partition_bytes,
            permission_skips: 0,
            current_path: None,
        }
    }

    /// Account one walked file against the partition being processed.
    pub fn account_file(&mut self, partition_index: usize, size_bytes: u64, path: String) {
        self.accumulated_bytes += size_bytes;
        self.per_partition_bytes[partition_index] += size_bytes;
        self.current_path = Some(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(name: &str, size_bytes: u64) -> Partition {
        Partition {
            id: format!("d0p-{name}"),
            disk_id: "d0".to_string(),
            device: format!("/dev/{name}"),
            name: name.to_string(),
            size_bytes,
            mount_point: None,
            drive_letter: None,
            volume_label: None,
            legacy_key: format!("{name} Test Disk"),
        }
    }

    #[test]
    fn capacity_aggregate_is_sum_of_targets() {
        let job = WipeJob::new(vec![partition("a", 100), partition("b", 250)], 40);
        assert_eq!(job.total_partition_bytes, 350);
        assert_eq!(job.total_used_bytes, 40);
        assert_eq!(job.per_partition_bytes, vec![0, 0]);
    }

    #[test]
    fn accounting_updates_aggregate_and_per_partition_counters() {
        let mut job = WipeJob::new(vec![partition("a", 100), partition("b", 250)], 0);
        job.account_file(0, 10, "/a/x".to_string());
        job.account_file(1, 30, "/b/y".to_string());
        job.account_file(1, 5, "/b/z".to_string());

        assert_eq!(job.accumulated_bytes, 45);
        assert_eq!(job.per_partition_bytes, vec![10, 35]);
        assert_eq!(job.current_path.as_deref(), Some("/b/z"));
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Paused.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed("io".to_string()).is_terminal());
    }
}
