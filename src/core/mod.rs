pub mod catalog;
pub mod job;
pub mod orchestrator;
pub mod progress;
pub mod signal;
pub mod space;

pub use catalog::{
    CatalogError, CatalogSnapshot, Disk, DiscoveryAdapter, DiskProbe, DriveCatalog, MediaType,
    Partition, PartitionProbe, MIN_PARTITION_BYTES,
};
pub use job::{JobState, WipeJob};
pub use orchestrator::{
    ControlError, JobStatus, OrchestratorStatus, StartError, WipeOptions, WipeOrchestrator,
};
pub use progress::{WipeEvent, WipeOutcome, WipeProgress};
pub use signal::{CancelToken, PauseGate, StepControl};
pub use space::{FixedSpaceProbe, PlatformSpaceProbe, SpaceProbe};
