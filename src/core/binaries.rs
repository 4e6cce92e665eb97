//! Locating the FFmpeg / FFprobe executables

use std::path::{Path, PathBuf};

/// Where an executable was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryLocation {
    /// Found on the system `PATH`
    System(PathBuf),
    /// Found in the application-provided directory (`<extra_dir>/bin/<name>`)
    Provided(PathBuf),
    NotInstalled,
}

impl BinaryLocation {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::System(path) | Self::Provided(path) => Some(path),
            Self::NotInstalled => None,
        }
    }
}

/// Look for `name` on `PATH`, then under `extra_dir/bin`
pub fn detect_binary(name: &str, extra_dir: Option<&Path>) -> BinaryLocation {
    if let Ok(path) = which::which(name) {
        return BinaryLocation::System(path);
    }

    if let Some(dir) = extra_dir {
        let candidate = dir.join("bin").join(name);
        if candidate.is_file() {
            return BinaryLocation::Provided(candidate);
        }
    }

    BinaryLocation::NotInstalled
}

/// Verify that a path exists and is executable
pub fn verify_executable(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("{:?} not found", path));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)
            .map_err(|e| format!("Failed to get metadata for {:?}: {}", path, e))?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(format!("{:?} is not executable", path));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_binary() {
        let location = detect_binary("ffaudiocue-no-such-tool", None);
        assert_eq!(location, BinaryLocation::NotInstalled);
        assert!(location.path().is_none());
    }

    #[test]
    fn test_provided_binary() {
        let temp_dir = TempDir::new().unwrap();
        let bin_dir = temp_dir.path().join("bin");
        std::fs::create_dir(&bin_dir).unwrap();
        let tool = bin_dir.join("ffaudiocue-bundled-tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        let location = detect_binary("ffaudiocue-bundled-tool", Some(temp_dir.path()));
        assert_eq!(location, BinaryLocation::Provided(tool));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_binary() {
        assert!(matches!(detect_binary("sh", None), BinaryLocation::System(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_executable_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let tool = temp_dir.path().join("tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(verify_executable(&tool).unwrap_err().contains("not executable"));

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(verify_executable(&tool).is_ok());

        assert!(verify_executable(&temp_dir.path().join("missing")).is_err());
    }
}
