//! Job description files
//!
//! A job file is the JSON hand-off from whatever parsed the CUE sheet:
//! the source audio, the track ranges, and optional tags and format
//! overrides. Settings fill in everything the file leaves out.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conversion::{EncodeOptions, TrackCommand, TrackCommandBuilder, TrackSegment};
use crate::core::{AppSettings, AudioFormat};
use crate::error::JobFileError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    /// Audio image the tracks are cut from
    pub source: PathBuf,
    /// CUE sheet location; its directory is the "same destination"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue: Option<PathBuf>,
    pub tracks: Vec<TrackSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Overrides `AppSettings::output_format` (e.g. "mp3")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_copy: Option<bool>,
    /// Total length of `source` in seconds; gives the last track a duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration: Option<f64>,
}

impl JobFile {
    /// Load a job file
    ///
    /// Relative paths inside it resolve against its directory, and always
    /// come out absolute: the encoder runs inside the job workspace.
    pub fn load(path: &Path) -> Result<Self, JobFileError> {
        let read_err = |source| JobFileError::Read {
            path: path.to_path_buf(),
            source,
        };
        let contents = fs::read_to_string(path).map_err(read_err)?;
        let mut job: JobFile = serde_json::from_str(&contents).map_err(|source| JobFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let absolute = std::path::absolute(path).map_err(read_err)?;
        let base = absolute.parent().unwrap_or(Path::new("/"));
        job.source = base.join(&job.source);
        job.cue = job.cue.map(|cue| base.join(cue));
        Ok(job)
    }

    /// Directory holding the CUE sheet, or the source when none is given
    pub fn cue_dir(&self) -> PathBuf {
        self.cue
            .as_deref()
            .unwrap_or(self.source.as_path())
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Encoder options from settings with this file's overrides applied
    pub fn encode_options(&self, settings: &AppSettings) -> Result<EncodeOptions, JobFileError> {
        let format = match &self.format {
            Some(name) => name.parse::<AudioFormat>()?,
            None => settings.output_format,
        };
        // A format override without a quality falls back to that format's default
        let quality = match (&self.quality, &self.format) {
            (Some(quality), _) => quality.clone(),
            (None, Some(_)) => format.default_quality().to_string(),
            (None, None) => settings.effective_quality().to_string(),
        };

        Ok(EncodeOptions {
            ffmpeg_cmd: settings.ffmpeg_cmd.clone(),
            loglevel: settings.ffmpeg_loglevel.clone(),
            format,
            quality,
            codec_copy: self.codec_copy.unwrap_or(settings.codec_copy),
        })
    }

    pub fn commands(&self, settings: &AppSettings) -> Result<Vec<TrackCommand>, JobFileError> {
        let mut builder = TrackCommandBuilder::new(&self.source, self.encode_options(settings)?)?;
        if let Some(total) = self.source_duration {
            builder = builder.source_duration(total);
        }
        builder.build_all(&self.tracks)
    }

    /// The CUE sheet (if known) and the audio image
    pub fn source_files(&self) -> Vec<&Path> {
        self.cue.iter().map(PathBuf::as_path).chain([self.source.as_path()]).collect()
    }

    /// Delete the source files after a finished extraction
    ///
    /// Nothing is deleted unless every source file is still present.
    pub fn remove_source_files(&self) -> Result<Vec<PathBuf>, JobFileError> {
        let files = self.source_files();
        if let Some(missing) = files.iter().find(|path| !path.is_file()) {
            return Err(JobFileError::SourceMissing(missing.to_path_buf()));
        }

        let mut removed = Vec::with_capacity(files.len());
        for path in files {
            fs::remove_file(path).map_err(|source| JobFileError::Remove {
                path: path.to_path_buf(),
                source,
            })?;
            log::info!("Deleted source {:?}", path);
            removed.push(path.to_path_buf());
        }
        Ok(removed)
    }

    pub fn destination(&self, settings: &AppSettings) -> PathBuf {
        settings.resolve_destination(&self.cue_dir(), self.performer.as_deref(), self.album.as_deref())
    }
}
