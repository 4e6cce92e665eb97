//! Background job sequencer
//!
//! Runs a job's track commands one after another on a dedicated worker
//! thread. The caller receives typed [`JobEvent`]s over a channel and can
//! cancel at any time through the [`JobHandle`].
//!
//! Lifecycle of a job:
//! 1. `submit` creates the workspace and spawns the worker
//! 2. tracks run in order; the first non-zero exit fails the job
//! 3. `Completed` is sent exactly once with the terminal outcome
//! 4. on success the outputs are reconciled into the destination
//! 5. the workspace is destroyed, whatever happened before

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::reconcile::{self, ConflictResolver, ReconcileOutcome};
use super::runner::{self, ProcessControl};
use super::{TrackCommand, Workspace, progress};
use crate::error::{ReconcileError, SubmitError};

/// Sentinel for "no track started yet"
const NO_TRACK: usize = usize::MAX;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// The encoder could not be started
    Launch { track_index: usize, message: String },
    /// The encoder exited with a non-zero status
    Encode { track_index: usize, exit_status: i32 },
    /// Supervising the running encoder failed
    Process { track_index: usize, message: String },
}

/// Terminal result of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(JobFailure),
    /// Cancelled by the caller; not an error
    Aborted,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            Self::Succeeded => JobState::Succeeded,
            Self::Failed(_) => JobState::Failed,
            Self::Aborted => JobState::Aborted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPhase {
    /// A track is starting; reset the progress indicator
    Start,
    /// Setup failed before the track produced any output
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountEvent {
    pub message: Option<String>,
    pub phase: CountPhase,
}

/// One recognised progress line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub raw_line: String,
    pub elapsed: Duration,
    /// Zero-based position in the job's command list
    pub track_index: usize,
    /// 0..=100, or always 0 when the track length is unknown
    pub percent: u8,
}

/// Messages from the worker, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Count(CountEvent),
    Progress(ProgressEvent),
    /// A track's process has exited; carries its exit status
    TrackFinished { track_index: usize, exit_status: i32 },
    /// Sent exactly once per job
    Completed(JobOutcome),
    /// Outputs were reconciled (only after a successful job)
    Reconciled(ReconcileOutcome),
    /// Moving outputs to the destination failed
    ReconcileFailed(String),
}

/// One run: the commands to execute and where their outputs go
pub struct Job {
    commands: Vec<TrackCommand>,
    destination: PathBuf,
    log_path: PathBuf,
    resolver: Box<dyn ConflictResolver>,
}

impl Job {
    pub fn new(
        commands: Vec<TrackCommand>,
        destination: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        resolver: impl ConflictResolver + 'static,
    ) -> Self {
        Self {
            commands,
            destination: destination.into(),
            log_path: log_path.into(),
            resolver: Box::new(resolver),
        }
    }

    pub fn commands(&self) -> &[TrackCommand] {
        &self.commands
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// What the worker hands back when it finishes
#[derive(Debug)]
pub struct JobReport {
    pub outcome: JobOutcome,
    /// `None` unless the job succeeded
    pub reconcile: Option<Result<ReconcileOutcome, ReconcileError>>,
}

/// State shared between the worker and handles
#[derive(Debug)]
struct JobShared {
    state: Mutex<JobState>,
    cancel_requested: AtomicBool,
    current_track: AtomicUsize,
    process: Mutex<Option<Arc<ProcessControl>>>,
}

impl JobShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(JobState::Running),
            cancel_requested: AtomicBool::new(false),
            current_track: AtomicUsize::new(NO_TRACK),
            process: Mutex::new(None),
        }
    }

    fn state(&self) -> JobState {
        *lock(&self.state)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        // Holding the state lock keeps the job from going terminal meanwhile
        let state = lock(&self.state);
        if *state != JobState::Running {
            return;
        }
        if self.cancel_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(state);

        log::info!("Job cancellation requested");
        if let Some(process) = lock(&self.process).as_ref()
            && let Err(e) = process.stop()
        {
            log::warn!("Failed to stop encoder process {}: {}", process.pid(), e);
        }
    }
}

/// Clears the sequencer's busy flag when the worker is done
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Accepts one job at a time and runs it in the background
pub struct JobSequencer {
    scratch_root: PathBuf,
    busy: Arc<AtomicBool>,
    current: Mutex<Option<Arc<JobShared>>>,
}

impl JobSequencer {
    /// Workspaces are created below `scratch_root`
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            busy: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        }
    }

    /// Workspaces are created below the system temp directory
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Whether a job is still running or cleaning up
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// State of the most recent job; terminal states persist until the next submit
    pub fn state(&self) -> JobState {
        lock(&self.current)
            .as_ref()
            .map(|shared| shared.state())
            .unwrap_or(JobState::Idle)
    }

    /// Cancel the running job, if any
    pub fn cancel(&self) {
        if let Some(shared) = lock(&self.current).as_ref() {
            shared.cancel();
        }
    }

    /// Start `job` on a new worker thread
    ///
    /// Returns immediately. Fails if a previous job has not finished its
    /// cleanup yet, if `job` has no commands, or if the workspace cannot be
    /// created.
    pub fn submit(&self, job: Job) -> Result<JobHandle, SubmitError> {
        if job.commands.is_empty() {
            return Err(SubmitError::Empty);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SubmitError::Busy);
        }
        let busy = BusyGuard(Arc::clone(&self.busy));

        let workspace = Workspace::create(&self.scratch_root)?;
        let workspace_path = workspace.path().to_path_buf();
        let shared = Arc::new(JobShared::new());
        let (tx, rx) = mpsc::channel();

        log::info!(
            "Starting job: {} track(s) -> {:?}",
            job.commands.len(),
            job.destination
        );

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("ffaudiocue-job".to_string())
            .spawn(move || {
                let _busy = busy;
                run_job(job, workspace, &worker_shared, &tx)
            })
            .map_err(SubmitError::Spawn)?;

        *lock(&self.current) = Some(Arc::clone(&shared));

        Ok(JobHandle {
            shared,
            events: rx,
            worker,
            workspace_path,
        })
    }
}

impl Default for JobSequencer {
    fn default() -> Self {
        Self::in_temp_dir()
    }
}

/// Caller's view of a running job
pub struct JobHandle {
    shared: Arc<JobShared>,
    events: Receiver<JobEvent>,
    worker: JoinHandle<JobReport>,
    workspace_path: PathBuf,
}

impl JobHandle {
    /// Event stream; disconnects after the workspace has been removed
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Request cancellation
    ///
    /// Idempotent, and a no-op once the job has reached a terminal state.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    /// Index of the track being processed, if one has started
    pub fn current_track(&self) -> Option<usize> {
        match self.shared.current_track.load(Ordering::SeqCst) {
            NO_TRACK => None,
            index => Some(index),
        }
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    /// Wait for the worker to finish, including reconciliation and cleanup
    pub fn join(self) -> JobReport {
        let track_index = self.current_track().unwrap_or(0);
        match self.worker.join() {
            Ok(report) => report,
            Err(_) => {
                log::error!("Job worker panicked");
                JobReport {
                    outcome: JobOutcome::Failed(JobFailure::Process {
                        track_index,
                        message: "worker thread panicked".to_string(),
                    }),
                    reconcile: None,
                }
            }
        }
    }
}

/// Worker body
fn run_job(mut job: Job, workspace: Workspace, shared: &JobShared, tx: &Sender<JobEvent>) -> JobReport {
    let outcome = run_tracks(&job, &workspace, shared, tx);

    *lock(&shared.state) = outcome.state();
    match &outcome {
        JobOutcome::Succeeded => log::info!("Job finished successfully"),
        JobOutcome::Aborted => log::info!("Job interrupted by user"),
        JobOutcome::Failed(failure) => log::error!("Job failed: {:?}", failure),
    }
    let _ = tx.send(JobEvent::Completed(outcome.clone()));

    let reconcile = if outcome == JobOutcome::Succeeded {
        let result = reconcile::reconcile(workspace.path(), &job.destination, job.resolver.as_mut());
        match &result {
            Ok(moved) => {
                let _ = tx.send(JobEvent::Reconciled(moved.clone()));
            }
            Err(e) => {
                log::error!("{}", e);
                let _ = tx.send(JobEvent::ReconcileFailed(e.to_string()));
            }
        }
        Some(result)
    } else {
        None
    };

    if let Err(e) = workspace.destroy() {
        log::warn!("{}", e);
    }

    JobReport { outcome, reconcile }
}

/// Execute the commands in order until one fails or cancel is requested
fn run_tracks(job: &Job, workspace: &Workspace, shared: &JobShared, tx: &Sender<JobEvent>) -> JobOutcome {
    let total = job.commands.len();

    for (index, command) in job.commands.iter().enumerate() {
        if shared.is_cancelled() {
            return JobOutcome::Aborted;
        }
        shared.current_track.store(index, Ordering::SeqCst);

        let label = command.display_label();
        let message = if label.is_empty() {
            format!("Track {}/{}", index + 1, total)
        } else {
            format!("Track {}/{}: {}", index + 1, total, label)
        };
        log::debug!("{}", message);
        let _ = tx.send(JobEvent::Count(CountEvent {
            message: Some(message),
            phase: CountPhase::Start,
        }));

        let dir = command.working_dir().unwrap_or(workspace.path());
        let process = match runner::start(command, dir, &job.log_path) {
            Ok(process) => process,
            Err(e) => {
                log::error!("{}", e);
                let _ = tx.send(JobEvent::Count(CountEvent {
                    message: Some(e.to_string()),
                    phase: CountPhase::Error,
                }));
                return JobOutcome::Failed(JobFailure::Launch {
                    track_index: index,
                    message: e.to_string(),
                });
            }
        };

        *lock(&shared.process) = Some(process.control());
        // Cancel may have landed before the process was registered
        if shared.is_cancelled()
            && let Err(e) = process.stop()
        {
            log::warn!("Failed to stop encoder process {}: {}", process.pid(), e);
        }

        for line in process.lines() {
            let Some(sample) = progress::parse(&line) else {
                continue;
            };
            if shared.is_cancelled() {
                continue;
            }
            let _ = tx.send(JobEvent::Progress(ProgressEvent {
                percent: progress::percent(sample.elapsed_secs(), command.total_secs()),
                elapsed: sample.elapsed(),
                track_index: index,
                raw_line: line,
            }));
        }

        let waited = process.wait();
        lock(&shared.process).take();

        let exit_status = match waited {
            Ok(status) => status,
            Err(e) => {
                log::error!("Lost track of encoder process: {}", e);
                return JobOutcome::Failed(JobFailure::Process {
                    track_index: index,
                    message: e.to_string(),
                });
            }
        };
        log::debug!("Track {} exited with status {}", index + 1, exit_status);
        let _ = tx.send(JobEvent::TrackFinished {
            track_index: index,
            exit_status,
        });

        if shared.is_cancelled() {
            return JobOutcome::Aborted;
        }
        if exit_status != 0 {
            return JobOutcome::Failed(JobFailure::Encode {
                track_index: index,
                exit_status,
            });
        }
    }

    JobOutcome::Succeeded
}
