//! Per-track encoder invocations
//!
//! A [`TrackCommand`] is the fully resolved argument vector for one track.
//! [`TrackCommandBuilder`] produces them from track time ranges and the
//! user's format choices, mirroring what the splitting library hands us.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{AudioFormat, sanitize_filename};
use crate::error::JobFileError;

/// Everything needed to launch the encoder for one track
///
/// Immutable once built. When `current_dir` is `None` the sequencer runs the
/// command inside the job's workspace, so relative output names land there.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCommand {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    duration_secs: f64,
    label: String,
}

impl TrackCommand {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            current_dir: None,
            duration_secs: 0.0,
            label: String::new(),
        }
    }

    /// Run in a fixed directory instead of the workspace
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Expected track length, used as the progress denominator
    pub fn duration_secs(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Human readable name shown in count events
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn total_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn display_label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for TrackCommand {
    /// Shell-like rendering used in the log file
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// One track's time range inside the source audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub title: String,
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds; `None` runs to the end of the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

impl TrackSegment {
    pub fn duration_secs(&self) -> f64 {
        self.end.map(|end| end - self.start).unwrap_or(0.0)
    }
}

/// Encoder settings resolved once before the job starts
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub ffmpeg_cmd: PathBuf,
    pub loglevel: String,
    pub format: AudioFormat,
    pub quality: String,
    /// Stream copy instead of re-encoding; output keeps the source container
    pub codec_copy: bool,
}

/// Builds FFmpeg track commands for one source file
pub struct TrackCommandBuilder {
    source: PathBuf,
    options: EncodeOptions,
    extra_args: Vec<String>,
    extension: String,
    source_duration: Option<f64>,
}

impl TrackCommandBuilder {
    pub fn new(source: impl Into<PathBuf>, options: EncodeOptions) -> Result<Self, JobFileError> {
        let source = source.into();
        let source_ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let (extra_args, extension) = if options.codec_copy {
            // FFmpeg cuts FLAC badly with stream copy
            if source_ext == "flac" {
                return Err(JobFileError::CodecCopyUnsupported);
            }
            (vec!["-c".to_string(), "copy".to_string()], source_ext)
        } else {
            let args = options.format.quality_args(&options.quality).ok_or_else(|| {
                JobFileError::UnknownQuality {
                    format: options.format.to_string(),
                    quality: options.quality.clone(),
                }
            })?;
            (
                args.split_whitespace().map(str::to_string).collect(),
                options.format.extension().to_string(),
            )
        };

        Ok(Self {
            source,
            options,
            extra_args,
            extension,
            source_duration: None,
        })
    }

    /// Length of the whole source, so an open-ended last track gets a duration
    pub fn source_duration(mut self, secs: f64) -> Self {
        self.source_duration = Some(secs).filter(|s| s.is_finite() && *s > 0.0);
        self
    }

    /// File name the track will be written to inside the workspace
    pub fn output_name(&self, segment: &TrackSegment) -> String {
        format!("{}.{}", sanitize_filename(&segment.title), self.extension)
    }

    pub fn build(&self, index: usize, segment: &TrackSegment) -> Result<TrackCommand, JobFileError> {
        let invalid = || JobFileError::InvalidRange {
            index,
            start: segment.start,
            end: segment.end.unwrap_or(f64::NAN),
        };
        if !segment.start.is_finite() || segment.start < 0.0 {
            return Err(invalid());
        }
        if let Some(end) = segment.end
            && (!end.is_finite() || end <= segment.start)
        {
            return Err(invalid());
        }

        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            self.options.loglevel.clone().into(),
            "-progress".into(),
            "pipe:1".into(),
            "-ss".into(),
            format!("{:.6}", segment.start).into(),
        ];
        if let Some(end) = segment.end {
            args.push("-to".into());
            args.push(format!("{:.6}", end).into());
        }
        args.push("-i".into());
        args.push(self.source.clone().into_os_string());
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push("-y".into());
        args.push(self.output_name(segment).into());

        Ok(TrackCommand::new(self.options.ffmpeg_cmd.clone(), args)
            .duration_secs(self.track_duration(segment))
            .label(segment.title.clone()))
    }

    fn track_duration(&self, segment: &TrackSegment) -> f64 {
        match (segment.end, self.source_duration) {
            (None, Some(total)) => (total - segment.start).max(0.0),
            _ => segment.duration_secs(),
        }
    }

    /// Commands for every segment, in order
    pub fn build_all(&self, segments: &[TrackSegment]) -> Result<Vec<TrackCommand>, JobFileError> {
        segments
            .iter()
            .enumerate()
            .map(|(index, segment)| self.build(index + 1, segment))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(format: AudioFormat, quality: &str, codec_copy: bool) -> EncodeOptions {
        EncodeOptions {
            ffmpeg_cmd: PathBuf::from("ffmpeg"),
            loglevel: "error".to_string(),
            format,
            quality: quality.to_string(),
            codec_copy,
        }
    }

    fn segment(title: &str, start: f64, end: Option<f64>) -> TrackSegment {
        TrackSegment {
            title: title.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_build_flac_track() {
        let builder =
            TrackCommandBuilder::new("/music/album.wav", options(AudioFormat::Flac, "quality 3", false))
                .unwrap();
        let cmd = builder.build(1, &segment("01 - Intro", 0.0, Some(90.5))).unwrap();

        let args: Vec<String> = cmd.args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.program(), "ffmpeg");
        assert!(args.windows(2).any(|w| w == ["-progress", "pipe:1"]));
        assert!(args.windows(2).any(|w| w == ["-compression_level", "3"]));
        assert!(args.windows(2).any(|w| w == ["-to", "90.500000"]));
        assert_eq!(args.last().map(String::as_str), Some("01 - Intro.flac"));
        assert_eq!(cmd.total_secs(), 90.5);
        assert_eq!(cmd.display_label(), "01 - Intro");
        assert!(cmd.working_dir().is_none());
    }

    #[test]
    fn test_last_track_has_no_end() {
        let builder =
            TrackCommandBuilder::new("/music/album.wav", options(AudioFormat::Wav, "Auto", false))
                .unwrap();
        let cmd = builder.build(9, &segment("Outro", 300.0, None)).unwrap();
        assert!(!cmd.args().iter().any(|a| a == "-to"));
        assert_eq!(cmd.total_secs(), 0.0);
    }

    #[test]
    fn test_last_track_uses_source_duration() {
        let builder =
            TrackCommandBuilder::new("/music/album.wav", options(AudioFormat::Wav, "Auto", false))
                .unwrap()
                .source_duration(420.0);
        let last = builder.build(9, &segment("Outro", 300.0, None)).unwrap();
        assert_eq!(last.total_secs(), 120.0);
        assert!(!last.args().iter().any(|a| a == "-to"));

        // Explicit ends still win
        let middle = builder.build(8, &segment("Song", 100.0, Some(300.0))).unwrap();
        assert_eq!(middle.total_secs(), 200.0);
    }

    #[test]
    fn test_codec_copy_keeps_source_extension() {
        let builder =
            TrackCommandBuilder::new("/music/album.APE", options(AudioFormat::Mp3, "Auto", true))
                .unwrap();
        let cmd = builder.build(1, &segment("a/b", 0.0, Some(1.0))).unwrap();
        let args: Vec<String> = cmd.args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert_eq!(args.last().map(String::as_str), Some("a_b.ape"));
    }

    #[test]
    fn test_codec_copy_refused_for_flac() {
        let result =
            TrackCommandBuilder::new("/music/album.FLAC", options(AudioFormat::Mp3, "Auto", true));
        assert!(matches!(result, Err(JobFileError::CodecCopyUnsupported)));
    }

    #[test]
    fn test_unknown_quality() {
        let result =
            TrackCommandBuilder::new("/music/album.wav", options(AudioFormat::Mp3, "ultra", false));
        assert!(matches!(result, Err(JobFileError::UnknownQuality { .. })));
    }

    #[test]
    fn test_invalid_ranges() {
        let builder =
            TrackCommandBuilder::new("/music/album.wav", options(AudioFormat::Ogg, "Auto", false))
                .unwrap();
        assert!(builder.build(1, &segment("x", 10.0, Some(5.0))).is_err());
        assert!(builder.build(1, &segment("x", -1.0, None)).is_err());
        assert!(builder.build(1, &segment("x", 1.0, Some(1.0))).is_err());
    }

    #[test]
    fn test_display_quotes_spaces() {
        let cmd = TrackCommand::new("ffmpeg", ["-i", "my file.wav", ""]);
        assert_eq!(cmd.to_string(), "ffmpeg -i \"my file.wav\" \"\"");
    }
}
