//! Scratch workspace for one job
//!
//! Each job gets a fresh directory `{root}/ffaudiocue_{uuid}/` that holds
//! encoder output until reconciliation moves it out. The directory is
//! removed when the job ends, and again on drop as a backstop.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;

const WORKSPACE_PREFIX: &str = "ffaudiocue_";

/// Exclusively owned scratch directory
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Allocate a new, uniquely named directory below `root`
    ///
    /// `root` is created if missing.
    pub fn create(root: &Path) -> Result<Self, WorkspaceError> {
        let err = |source| WorkspaceError::Create {
            root: root.to_path_buf(),
            source,
        };

        fs::create_dir_all(root).map_err(err)?;

        let path = root.join(format!("{}{}", WORKSPACE_PREFIX, uuid::Uuid::new_v4().simple()));
        // create_dir (not create_dir_all) so a collision is an error, never a reuse
        fs::create_dir(&path).map_err(err)?;

        log::debug!("Created workspace {:?}", path);
        Ok(Self { path })
    }

    /// Create below the system temp directory
    pub fn create_in_temp() -> Result<Self, WorkspaceError> {
        Self::create(&std::env::temp_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the workspace
    ///
    /// Idempotent: a workspace that is already gone is not an error.
    pub fn destroy(&self) -> Result<(), WorkspaceError> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                log::debug!("Removed workspace {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Destroy {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_is_unique() {
        let root = TempDir::new().unwrap();
        let a = Workspace::create(root.path()).unwrap();
        let b = Workspace::create(root.path()).unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().starts_with(root.path()));
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(WORKSPACE_PREFIX));
    }

    #[test]
    fn test_create_makes_missing_root() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("a").join("b");
        let workspace = Workspace::create(&nested).unwrap();
        assert!(workspace.path().is_dir());
    }

    #[test]
    fn test_destroy_twice() {
        let root = TempDir::new().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        fs::write(workspace.path().join("track.flac"), "data").unwrap();
        fs::create_dir(workspace.path().join("nested")).unwrap();

        workspace.destroy().unwrap();
        assert!(!workspace.path().exists());
        workspace.destroy().unwrap();
    }

    #[test]
    fn test_destroy_partially_emptied() {
        let root = TempDir::new().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let kept = workspace.path().join("a.mp3");
        let moved = workspace.path().join("b.mp3");
        fs::write(&kept, "a").unwrap();
        fs::write(&moved, "b").unwrap();
        fs::rename(&moved, root.path().join("b.mp3")).unwrap();

        workspace.destroy().unwrap();
        assert!(!workspace.path().exists());
        assert!(root.path().join("b.mp3").exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = TempDir::new().unwrap();
        let path = {
            let workspace = Workspace::create(root.path()).unwrap();
            fs::write(workspace.path().join("x.wav"), "x").unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
