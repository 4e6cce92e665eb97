//! Track extraction jobs
//!
//! Runs one FFmpeg process per track in a background worker, reports
//! progress over a channel, and moves the finished files from a scratch
//! workspace into the destination directory.

mod command;
pub mod progress;
mod reconcile;
pub mod runner;
mod sequencer;
mod workspace;

pub use command::{EncodeOptions, TrackCommand, TrackCommandBuilder, TrackSegment};
pub use progress::ProgressSample;
pub use reconcile::{ConflictPolicy, ConflictResolver, ReconcileOutcome, reconcile};
pub use runner::{ProcessControl, ProcessHandle};
pub use sequencer::{
    CountEvent, CountPhase, Job, JobEvent, JobFailure, JobHandle, JobOutcome, JobReport,
    JobSequencer, JobState, ProgressEvent,
};
pub use workspace::Workspace;
