//! Application settings
//!
//! Persisted as JSON in the per-user config directory. The job core never
//! reads these at run time: callers resolve them into
//! [`EncodeOptions`](crate::conversion::EncodeOptions) and a destination path
//! before submitting a job.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::AudioFormat;
use crate::error::SettingsError;

const APP_DIR_NAME: &str = "FFaudiocue";

/// User preferences consumed when building a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Encoder executable (name on PATH or absolute path)
    pub ffmpeg_cmd: PathBuf,
    /// Value passed to `-loglevel`
    pub ffmpeg_loglevel: String,
    pub output_format: AudioFormat,
    /// Preset name from [`AudioFormat::presets`]
    pub quality: String,
    /// Cut with `-c copy` instead of re-encoding
    pub codec_copy: bool,
    /// Destination directory for finished tracks
    pub destination: PathBuf,
    /// Write tracks next to the CUE sheet instead of `destination`
    pub same_destination: bool,
    /// Append `<performer>/<album>` below the destination
    pub collection_layout: bool,
    /// Directory holding `ffmpeg.log`; `None` uses the app log directory
    pub log_dir: Option<PathBuf>,
    /// Where job workspaces are created; `None` uses the system temp dir
    pub scratch_root: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            ffmpeg_cmd: PathBuf::from("ffmpeg"),
            ffmpeg_loglevel: "error".to_string(),
            output_format: AudioFormat::default(),
            quality: AudioFormat::default().default_quality().to_string(),
            codec_copy: false,
            destination: dirs::audio_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            same_destination: false,
            collection_layout: false,
            log_dir: None,
            scratch_root: None,
        }
    }
}

impl AppSettings {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Get the app config directory, creating it if needed
    fn get_app_config_dir() -> Result<PathBuf, SettingsError> {
        let config_dir = dirs::config_dir().ok_or(SettingsError::NoDirectory("config"))?;
        let app_dir = config_dir.join(APP_DIR_NAME);

        if !app_dir.exists() {
            std::fs::create_dir_all(&app_dir)?;
        }

        Ok(app_dir)
    }

    pub fn settings_path() -> Result<PathBuf, SettingsError> {
        Ok(Self::get_app_config_dir()?.join(Self::SETTINGS_FILE))
    }

    /// Load settings from disk, or return defaults if missing or unreadable
    pub fn load() -> Self {
        match Self::settings_path().and_then(|path| Self::load_from(&path)) {
            Ok(settings) => {
                log::debug!("Loaded settings from disk");
                settings
            }
            Err(e) => {
                log::debug!("Using default settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// The stored quality, or the format's default when it names no preset
    /// of `output_format` (e.g. after only the format was changed)
    pub fn effective_quality(&self) -> &str {
        if self.output_format.quality_args(&self.quality).is_some() {
            &self.quality
        } else {
            self.output_format.default_quality()
        }
    }

    /// Final destination for the tracks of one CUE sheet
    ///
    /// `cue_dir` is the directory holding the CUE sheet. Missing tags fall
    /// back to "Unknown Artist" / "Unknown Album".
    pub fn resolve_destination(
        &self,
        cue_dir: &Path,
        performer: Option<&str>,
        album: Option<&str>,
    ) -> PathBuf {
        let base = if self.same_destination {
            cue_dir.to_path_buf()
        } else {
            self.destination.clone()
        };

        if self.collection_layout {
            base.join(super::sanitize_filename(performer.unwrap_or("Unknown Artist")))
                .join(super::sanitize_filename(album.unwrap_or("Unknown Album")))
        } else {
            base
        }
    }
}
