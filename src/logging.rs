//! Logging configuration for FFaudiocue
//!
//! Application logs are written to both the terminal and a file at:
//! `~/Library/Logs/FFaudiocue/ffaudiocue.log` on macOS, or
//! `<data_local_dir>/FFaudiocue/logs/ffaudiocue.log` elsewhere.
//!
//! Encoder output goes to a separate `ffmpeg.log` in the same directory,
//! written by the job runner.

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const APP_LOG_FILE: &str = "ffaudiocue.log";
const FFMPEG_LOG_FILE: &str = "ffmpeg.log";
const ROTATE_ABOVE_BYTES: u64 = 10 * 1024 * 1024;

/// Get the log directory path
pub fn get_log_directory() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Logs").join("FFaudiocue"))
    } else {
        dirs::data_local_dir().map(|d| d.join("FFaudiocue").join("logs"))
    }
}

/// Get the application log file path
pub fn get_log_file_path() -> Option<PathBuf> {
    get_log_directory().map(|d| d.join(APP_LOG_FILE))
}

/// Encoder log path inside `log_dir`, or the default log directory
pub fn ffmpeg_log_path(log_dir: Option<&Path>) -> Option<PathBuf> {
    match log_dir {
        Some(dir) => Some(dir.join(FFMPEG_LOG_FILE)),
        None => get_log_directory().map(|d| d.join(FFMPEG_LOG_FILE)),
    }
}

/// Empty a log file, keeping the file itself
///
/// The job core only ever appends; callers decide when a log starts over.
pub fn clear_log_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(())
}

/// Move `path` aside to `<path>.old` once it grows past the size limit
fn rotate_if_large(path: &Path) {
    if let Ok(metadata) = fs::metadata(path)
        && metadata.len() > ROTATE_ABOVE_BYTES
    {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".old");
        let _ = fs::rename(path, PathBuf::from(backup));
    }
}

fn log_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off) // Don't show thread IDs
        .set_target_level(LevelFilter::Off) // Don't show module targets
        .build()
}

/// Initialize the logging system
///
/// Sets up combined logging to:
/// - Terminal (`terminal_level` and above)
/// - File (debug and above, for bug reports)
///
/// Returns the path to the log file on success
pub fn init_logging(terminal_level: LevelFilter) -> Option<PathBuf> {
    let log_dir = match get_log_directory() {
        Some(d) => d,
        None => {
            eprintln!("Warning: Could not determine log directory");
            init_terminal_only(terminal_level);
            return None;
        }
    };

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        init_terminal_only(terminal_level);
        return None;
    }

    let log_path = log_dir.join(APP_LOG_FILE);
    rotate_if_large(&log_path);

    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            init_terminal_only(terminal_level);
            return None;
        }
    };

    let config = log_config();
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(terminal_level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Debug, config, log_file),
    ];

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: Logger already initialized");
    }

    log::info!("=== FFaudiocue session started ===");
    log::debug!("Log file: {}", log_path.display());

    Some(log_path)
}

/// Initialize terminal-only logging (fallback if file logging fails)
fn init_terminal_only(level: LevelFilter) {
    let term_logger = TermLogger::new(level, log_config(), TerminalMode::Mixed, ColorChoice::Auto);
    let _ = CombinedLogger::init(vec![term_logger]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_file_path_is_inside_log_directory() {
        let dir = get_log_directory().unwrap();
        let file = get_log_file_path().unwrap();

        assert!(dir.to_string_lossy().contains("FFaudiocue"));
        assert!(file.starts_with(&dir));
        assert!(file.to_string_lossy().ends_with("ffaudiocue.log"));
    }

    #[test]
    fn test_ffmpeg_log_path() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            ffmpeg_log_path(Some(temp_dir.path())),
            Some(temp_dir.path().join("ffmpeg.log"))
        );
        assert_eq!(
            ffmpeg_log_path(None),
            get_log_directory().map(|d| d.join("ffmpeg.log"))
        );
    }

    #[test]
    fn test_clear_log_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ffmpeg.log");
        fs::write(&path, "old output\n").unwrap();

        clear_log_file(&path).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        let fresh = temp_dir.path().join("new").join("ffmpeg.log");
        clear_log_file(&fresh).unwrap();
        assert!(fresh.exists());
    }

    #[test]
    fn test_rotate_if_large() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");

        fs::write(&path, "small").unwrap();
        rotate_if_large(&path);
        assert!(path.exists());

        let file = fs::File::create(&path).unwrap();
        file.set_len(ROTATE_ABOVE_BYTES + 1).unwrap();
        rotate_if_large(&path);
        assert!(!path.exists());
        assert!(temp_dir.path().join("app.log.old").exists());
    }
}
