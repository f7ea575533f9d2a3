//! The wipe execution engine.
//!
//! At most one job is active at a time. `start` spawns a dedicated worker
//! thread which walks the target partitions sequentially, accounts every
//! file it encounters, and streams progress snapshots to the registered
//! consumer. The worker is the sole mutator of job state and counters;
//! the control side reads published copies and signals through the cancel
//! token and pause gate, both observed only at file boundaries.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::catalog::Partition;
use crate::core::job::{JobState, WipeJob};
use crate::core::progress::{self, WipeEvent, WipeOutcome, WipeProgress};
use crate::core::signal::{CancelToken, PauseGate, StepControl};
use crate::core::space::SpaceProbe;
use crate::logging::LogThrottle;

#[derive(Debug, Clone)]
pub struct WipeOptions {
    /// Delay applied after each accounted file so a watching consumer can
    /// keep up.
    pub file_pace: Duration,
}

impl Default for WipeOptions {
    fn default() -> Self {
        Self {
            file_pace: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("a wipe job is already active")]
    Busy,
    #[error("target set is empty or contains a partition without a mount point")]
    InvalidRequest,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("no active wipe job")]
    NoActiveJob,
    #[error("wipe job has not reached a terminal state")]
    NotTerminal,
}

/// Published view of the active job: replaced wholesale by the worker,
/// cloned out for callers.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress: Option<WipeProgress>,
}

#[derive(Debug, Clone)]
pub enum OrchestratorStatus {
    Idle,
    Active(JobStatus),
}

struct ActiveJob {
    cancel: CancelToken,
    pause: PauseGate,
    published: Arc<Mutex<JobStatus>>,
    worker: Option<JoinHandle<()>>,
}

pub struct WipeOrchestrator {
    space: Arc<dyn SpaceProbe>,
    options: WipeOptions,
    active: Mutex<Option<ActiveJob>>,
}

impl WipeOrchestrator {
    pub fn new(space: Arc<dyn SpaceProbe>, options: WipeOptions) -> Self {
        Self {
            space,
            options,
            active: Mutex::new(None),
        }
    }

    /// Begin a destructive run over `targets`. Progress and the terminal
    /// outcome arrive on `events`; the job slot stays occupied until the
    /// terminal state is `acknowledge`d.
    pub fn start(
        &self,
        targets: Vec<Partition>,
        events: mpsc::Sender<WipeEvent>,
    ) -> Result<Uuid, StartError> {
        if targets.is_empty() || targets.iter().any(|t| t.mount_point.is_none()) {
            return Err(StartError::InvalidRequest);
        }

        let mut slot = self.active.lock().expect("job slot poisoned");
        if slot.is_some() {
            return Err(StartError::Busy);
        }

        let total_used_bytes = targets
            .iter()
            .map(|target| {
                let mount = target.mount_point.as_deref().expect("validated above");
                match self.space.used_bytes(mount) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        warn!(partition = %target.id, %error, "Used-space query failed, counting zero");
                        0
                    }
                }
            })
            .sum();

        let job = WipeJob::new(targets, total_used_bytes);
        let job_id = job.id;
        let cancel = CancelToken::new();
        let pause = PauseGate::new();
        let published = Arc::new(Mutex::new(JobStatus {
            job_id,
            state: JobState::Running,
            progress: None,
        }));

        info!(
            %job_id,
            partitions = job.targets.len(),
            total_partition_bytes = job.total_partition_bytes,
            total_used_bytes,
            "Starting wipe job"
        );

        let runner = JobRunner {
            job,
            options: self.options.clone(),
            cancel: cancel.clone(),
            pause: pause.clone(),
            published: Arc::clone(&published),
            events,
            throttle: LogThrottle::new(Duration::from_millis(500)),
        };
        let worker = thread::spawn(move || runner.run());

        *slot = Some(ActiveJob {
            cancel,
            pause,
            published,
            worker: Some(worker),
        });
        Ok(job_id)
    }

    /// Request a pause. Takes effect at the worker's next file-boundary
    /// check, not immediately.
    pub fn pause(&self) -> Result<(), ControlError> {
        self.with_live_job(|active| active.pause.pause())
    }

    pub fn resume(&self) -> Result<(), ControlError> {
        self.with_live_job(|active| active.pause.resume())
    }

    /// Request cancellation. Cooperative: observed at the next file
    /// boundary; an in-flight file operation is never interrupted.
    pub fn cancel(&self) -> Result<(), ControlError> {
        self.with_live_job(|active| {
            active.cancel.trigger();
            active.pause.interrupt();
        })
    }

    /// Consume a terminal job, returning the orchestrator to idle.
    pub fn acknowledge(&self) -> Result<WipeOutcome, ControlError> {
        let mut slot = self.active.lock().expect("job slot poisoned");
        let active = slot.as_mut().ok_or(ControlError::NoActiveJob)?;

        let state = active
            .published
            .lock()
            .expect("job status poisoned")
            .state
            .clone();
        let outcome = match state {
            JobState::Completed => WipeOutcome::Completed,
            JobState::Cancelled => WipeOutcome::Cancelled,
            JobState::Failed(message) => WipeOutcome::Failed(message),
            JobState::Running | JobState::Paused => return Err(ControlError::NotTerminal),
        };

        if let Some(handle) = active.worker.take() {
            let _ = handle.join();
        }
        *slot = None;
        Ok(outcome)
    }

    pub fn status(&self) -> OrchestratorStatus {
        let slot = self.active.lock().expect("job slot poisoned");
        match slot.as_ref() {
            Some(active) => OrchestratorStatus::Active(
                active.published.lock().expect("job status poisoned").clone(),
            ),
            None => OrchestratorStatus::Idle,
        }
    }

    fn with_live_job(&self, f: impl FnOnce(&ActiveJob)) -> Result<(), ControlError> {
        let slot = self.active.lock().expect("job slot poisoned");
        match slot.as_ref() {
            Some(active)
                if !active
                    .published
                    .lock()
                    .expect("job status poisoned")
                    .state
                    .is_terminal() =>
            {
                f(active);
                Ok(())
            }
            _ => Err(ControlError::NoActiveJob),
        }
    }
}

enum WalkAbort {
    Cancelled,
    Io(io::Error),
}

/// Worker-side execution state. Owns the job outright; everything the
/// control side sees goes through `published` or the event channel.
struct JobRunner {
    job: WipeJob,
    options: WipeOptions,
    cancel: CancelToken,
    pause: PauseGate,
    published: Arc<Mutex<JobStatus>>,
    events: mpsc::Sender<WipeEvent>,
    throttle: LogThrottle,
}

impl JobRunner {
    fn run(mut self) {
        let outcome = self.execute();
        let state = match &outcome {
            WipeOutcome::Completed => JobState::Completed,
            WipeOutcome::Cancelled => JobState::Cancelled,
            WipeOutcome::Failed(message) => JobState::Failed(message.clone()),
        };
        self.set_state(state);

        match &outcome {
            WipeOutcome::Completed => info!(
                job_id = %self.job.id,
                accumulated_bytes = self.job.accumulated_bytes,
                permission_skips = self.job.permission_skips,
                "Wipe job completed"
            ),
            WipeOutcome::Cancelled => info!(job_id = %self.job.id, "Wipe job cancelled"),
            WipeOutcome::Failed(message) => {
                warn!(job_id = %self.job.id, error = %message, "Wipe job failed")
            }
        }

        let _ = self.events.blocking_send(WipeEvent::Finished(outcome));
    }

    fn execute(&mut self) -> WipeOutcome {
        let targets = self.job.targets.clone();
        let partition_count = targets.len();

        for (index, partition) in targets.iter().enumerate() {
            let mount = partition.mount_point.clone().expect("validated at start");
            debug!(
                partition = %partition.id,
                index = index + 1,
                partition_count,
                "Walking partition"
            );

            match self.walk_dir(&mount, index) {
                Ok(()) => {}
                Err(WalkAbort::Cancelled) => return WipeOutcome::Cancelled,
                Err(WalkAbort::Io(error)) => return WipeOutcome::Failed(error.to_string()),
            }
        }

        // The final event reports full capacity on both axes regardless of
        // bytes actually walked.
        let final_progress = WipeProgress {
            fraction_complete: 1.0,
            current_path: self.job.current_path.clone().unwrap_or_default(),
            accumulated_bytes: self.job.total_partition_bytes,
            total_used_bytes: self.job.total_partition_bytes,
            partition_index: partition_count,
            partition_count,
        };
        self.publish_progress(final_progress.clone());
        let _ = self
            .events
            .blocking_send(WipeEvent::Progress(final_progress));

        WipeOutcome::Completed
    }

    fn walk_dir(&mut self, dir: &Path, partition_index: usize) -> Result<(), WalkAbort> {
        let reader = match fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(error) if is_permission_error(&error) => {
                self.job.permission_skips += 1;
                debug!(path = %dir.display(), "Skipping unreadable directory");
                return Ok(());
            }
            Err(error) => return Err(WalkAbort::Io(error)),
        };

        let mut entries = Vec::new();
        for entry in reader {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(error) if is_permission_error(&error) => self.job.permission_skips += 1,
                Err(error) => return Err(WalkAbort::Io(error)),
            }
        }
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            if self.pause_point() == StepControl::Cancelled {
                return Err(WalkAbort::Cancelled);
            }

            let path = entry.path();
            let metadata = match path.symlink_metadata() {
                Ok(metadata) => metadata,
                Err(error) if is_permission_error(&error) => {
                    self.job.permission_skips += 1;
                    continue;
                }
                Err(error) => return Err(WalkAbort::Io(error)),
            };

            if metadata.is_dir() {
                self.walk_dir(&path, partition_index)?;
            } else {
                self.account_file(partition_index, &path, metadata.len());
            }
        }

        Ok(())
    }

    /// The worker's single suspension point. Publishes `Paused` only once
    /// the gate is actually observed, and `Running` again on wake.
    fn pause_point(&self) -> StepControl {
        if self.cancel.is_triggered() {
            return StepControl::Cancelled;
        }
        if !self.pause.is_paused() {
            return StepControl::Continue;
        }

        self.set_state(JobState::Paused);
        debug!(job_id = %self.job.id, "Wipe job paused");
        let control = self.pause.wait_while_paused(&self.cancel);
        if control != StepControl::Cancelled {
            self.set_state(JobState::Running);
            debug!(job_id = %self.job.id, "Wipe job resumed");
        }
        control
    }

    fn account_file(&mut self, partition_index: usize, path: &Path, size_bytes: u64) {
        let display_path = progress::shorten_path(&path.to_string_lossy());
        self.job
            .account_file(partition_index, size_bytes, display_path.clone());

        let snapshot = WipeProgress {
            fraction_complete: progress::fraction(
                self.job.accumulated_bytes,
                self.job.total_partition_bytes,
            ),
            current_path: display_path,
            accumulated_bytes: self.job.accumulated_bytes,
            total_used_bytes: self.job.total_used_bytes,
            partition_index: partition_index + 1,
            partition_count: self.job.targets.len(),
        };
        self.publish_progress(snapshot.clone());
        let _ = self.events.blocking_send(WipeEvent::Progress(snapshot));

        if self.throttle.should_log() {
            debug!(
                accumulated_bytes = self.job.accumulated_bytes,
                path = %path.display(),
                "Wipe progress"
            );
        }

        if !self.options.file_pace.is_zero() {
            thread::sleep(self.options.file_pace);
        }
    }

    fn set_state(&self, state: JobState) {
        self.published.lock().expect("job status poisoned").state = state;
    }

    fn publish_progress(&self, progress: WipeProgress) {
        self.published
            .lock()
            .expect("job status poisoned")
            .progress = Some(progress);
    }
}

fn is_permission_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    matches!(
        error.raw_os_error(),
        Some(code) if code == libc::EACCES || code == libc::EPERM
    )
}
