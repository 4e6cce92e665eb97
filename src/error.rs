//! Error types for the job core
//!
//! Every failure the background job can hit maps to one of these enums.
//! None of them cross the worker's event channel as a panic: the sequencer
//! folds them into a terminal [`JobOutcome`](crate::conversion::JobOutcome).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while starting or supervising an external process
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The executable is missing or cannot be executed.
    #[error("cannot launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The log file could not be opened or written.
    #[error("cannot write log file {path:?}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Waiting on or signalling the running process failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RunnerError {
    /// Whether this error happened before the process ever ran
    pub fn is_launch(&self) -> bool {
        matches!(self, Self::Launch { .. } | Self::Log { .. })
    }
}

/// Failures while creating a scratch workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace in {root:?}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove workspace {path:?}: {source}")]
    Destroy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Filesystem failures while moving artifacts to the destination
///
/// A user choosing "cancel" is not an error; see
/// [`ReconcileOutcome::Cancelled`](crate::conversion::ReconcileOutcome).
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to create destination directory {path:?}: {source}")]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read workspace {path:?}: {source}")]
    ReadWorkspace {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to move {from:?} to {to:?}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reasons [`JobSequencer::submit`](crate::conversion::JobSequencer::submit) refuses a job
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("another job is still running")]
    Busy,

    #[error("job has no tracks to process")]
    Empty,

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Settings persistence failures
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine {0} directory")]
    NoDirectory(&'static str),

    #[error("settings I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while turning a job description into track commands
#[derive(Debug, Error)]
pub enum JobFileError {
    #[error("cannot read job file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("job file {path:?} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported audio format '{0}'")]
    UnknownFormat(String),

    #[error("unknown quality preset '{quality}' for {format}")]
    UnknownQuality { format: String, quality: String },

    #[error("codec copy is not available for FLAC sources")]
    CodecCopyUnsupported,

    #[error("track {index} has an invalid time range ({start}s to {end}s)")]
    InvalidRange { index: usize, start: f64, end: f64 },

    #[error("source file {0:?} is missing")]
    SourceMissing(PathBuf),

    #[error("failed to delete {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
