//! Moving finished tracks from the workspace to the destination
//!
//! Conflicts are collected first and the resolver is asked once with the
//! complete set, before any file is moved.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ReconcileError;

/// Decision for files that already exist at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Move every file, replacing existing ones
    OverwriteAll,
    /// Move only files without an existing counterpart
    SkipConflicting,
    /// Move nothing
    Cancel,
}

/// Asked once per job when some outputs would replace existing files
///
/// `conflicts` holds the destination paths that already exist. Called
/// synchronously on the job's worker thread.
pub trait ConflictResolver: Send {
    fn resolve(&mut self, conflicts: &[PathBuf]) -> ConflictPolicy;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&[PathBuf]) -> ConflictPolicy + Send,
{
    fn resolve(&mut self, conflicts: &[PathBuf]) -> ConflictPolicy {
        self(conflicts)
    }
}

/// A fixed answer, for non-interactive callers
impl ConflictResolver for ConflictPolicy {
    fn resolve(&mut self, _conflicts: &[PathBuf]) -> ConflictPolicy {
        *self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Files now at the destination, and conflicting files left behind
    Moved {
        moved: Vec<PathBuf>,
        skipped: Vec<PathBuf>,
    },
    /// The resolver chose [`ConflictPolicy::Cancel`]
    Cancelled,
}

impl ReconcileOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Move every file in `workspace` into `destination`
///
/// The destination is created (with parents) before conflicts are
/// evaluated. The first failed move stops the remaining ones.
pub fn reconcile(
    workspace: &Path,
    destination: &Path,
    resolver: &mut dyn ConflictResolver,
) -> Result<ReconcileOutcome, ReconcileError> {
    fs::create_dir_all(destination).map_err(|source| ReconcileError::CreateDestination {
        path: destination.to_path_buf(),
        source,
    })?;

    let mut planned = Vec::new();
    let mut conflicts = Vec::new();
    for entry in WalkDir::new(workspace)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ReconcileError::ReadWorkspace {
            path: workspace.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let target = destination.join(entry.file_name());
        let exists = target.symlink_metadata().is_ok();
        if exists {
            conflicts.push(target.clone());
        }
        planned.push((entry.into_path(), target, exists));
    }

    let policy = if conflicts.is_empty() {
        ConflictPolicy::OverwriteAll
    } else {
        log::info!("{} file(s) already exist in {:?}", conflicts.len(), destination);
        let policy = resolver.resolve(&conflicts);
        log::debug!("Conflict policy: {:?}", policy);
        policy
    };

    if policy == ConflictPolicy::Cancel {
        log::info!("Moving files to {:?} cancelled", destination);
        return Ok(ReconcileOutcome::Cancelled);
    }

    let mut moved = Vec::with_capacity(planned.len());
    let mut skipped = Vec::new();
    for (from, to, exists) in planned {
        if exists && policy == ConflictPolicy::SkipConflicting {
            log::debug!("Skipping existing {:?}", to);
            skipped.push(to);
            continue;
        }
        move_file(&from, &to).map_err(|source| ReconcileError::Move {
            from: from.clone(),
            to: to.clone(),
            source,
        })?;
        moved.push(to);
    }

    log::info!(
        "Moved {} file(s) to {:?} ({} skipped)",
        moved.len(),
        destination,
        skipped.len()
    );
    Ok(ReconcileOutcome::Moved { moved, skipped })
}

/// Rename, falling back to copy + delete across filesystems
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}
