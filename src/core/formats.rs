//! Output formats and their quality presets
//!
//! Each format carries an ordered list of named presets. The names are what
//! a user picks in the settings; the values are raw FFmpeg arguments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JobFileError;

/// Preset name meaning "let the encoder decide"
pub const AUTO: &str = "Auto";

const WAV_PRESETS: &[(&str, &str)] = &[(AUTO, "")];

const FLAC_PRESETS: &[(&str, &str)] = &[
    (AUTO, ""),
    ("very high quality", "-compression_level 0"),
    ("quality 1", "-compression_level 1"),
    ("quality 2", "-compression_level 2"),
    ("quality 3", "-compression_level 3"),
    ("quality 4", "-compression_level 4"),
    ("Standard quality", "-compression_level 5"),
    ("quality 6", "-compression_level 6"),
    ("quality 7", "-compression_level 7"),
    ("low quality", "-compression_level 8"),
];

const OGG_PRESETS: &[(&str, &str)] = &[
    (AUTO, ""),
    ("very poor quality", "-aq 1"),
    ("VBR 92 kbit/s", "-aq 2"),
    ("VBR 128 kbit/s", "-aq 3"),
    ("VBR 160 kbit/s", "-aq 4"),
    ("VBR 175 kbit/s", "-aq 5"),
    ("VBR 192 kbit/s", "-aq 6"),
    ("VBR 220 kbit/s", "-aq 7"),
    ("VBR 260 kbit/s", "-aq 8"),
    ("VBR 320 kbit/s", "-aq 9"),
    ("very good quality", "-aq 10"),
];

const OPUS_PRESETS: &[(&str, &str)] = &[
    (AUTO, ""),
    ("low quality 0", "-compression_level 0"),
    ("low quality 1", "-compression_level 1"),
    ("quality 2", "-compression_level 2"),
    ("quality 3", "-compression_level 3"),
    ("quality 4", "-compression_level 4"),
    ("medium quality 5", "-compression_level 5"),
    ("quality 6", "-compression_level 6"),
    ("quality 7", "-compression_level 7"),
    ("quality 8", "-compression_level 8"),
    ("high quality 9", "-compression_level 9"),
    ("highest quality 10 (default)", "-compression_level 10"),
];

const MP3_PRESETS: &[(&str, &str)] = &[
    (AUTO, ""),
    ("VBR 128 kbit/s (low quality)", "-b:a 128k"),
    ("VBR 160 kbit/s", "-b:a 160k"),
    ("VBR 192 kbit/s", "-b:a 192k"),
    ("VBR 260 kbit/s", "-b:a 260k"),
    ("CBR 320 kbit/s (very good quality)", "-b:a 320k"),
];

/// Audio container/codec the tracks are written as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Flac,
    Ogg,
    Opus,
    Mp3,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Flac
    }
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 5] = [
        AudioFormat::Wav,
        AudioFormat::Flac,
        AudioFormat::Ogg,
        AudioFormat::Opus,
        AudioFormat::Mp3,
    ];

    /// File extension (also the FFmpeg muxer name)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Mp3 => "mp3",
        }
    }

    /// Ordered `(name, ffmpeg args)` presets
    pub fn presets(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Wav => WAV_PRESETS,
            Self::Flac => FLAC_PRESETS,
            Self::Ogg => OGG_PRESETS,
            Self::Opus => OPUS_PRESETS,
            Self::Mp3 => MP3_PRESETS,
        }
    }

    /// Preset selected when the format is picked without a quality
    pub fn default_quality(&self) -> &'static str {
        match self {
            Self::Wav => AUTO,
            Self::Flac => "Standard quality",
            Self::Ogg => "VBR 175 kbit/s",
            Self::Opus => "medium quality 5",
            Self::Mp3 => "VBR 192 kbit/s",
        }
    }

    /// FFmpeg arguments for a named preset, `None` if the name is unknown
    pub fn quality_args(&self, quality: &str) -> Option<&'static str> {
        self.presets()
            .iter()
            .find(|(name, _)| *name == quality)
            .map(|(_, args)| *args)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = JobFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| JobFileError::UnknownFormat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_has_only_auto() {
        assert_eq!(AudioFormat::Wav.presets(), &[(AUTO, "")]);
    }

    #[test]
    fn test_default_quality_is_a_preset() {
        for format in AudioFormat::ALL {
            assert!(format.quality_args(format.default_quality()).is_some(), "{}", format);
        }
        assert_eq!(AudioFormat::Mp3.quality_args(AudioFormat::Mp3.default_quality()), Some("-b:a 192k"));
        assert_eq!(AudioFormat::Ogg.quality_args(AudioFormat::Ogg.default_quality()), Some("-aq 5"));
        assert_eq!(
            AudioFormat::Flac.quality_args(AudioFormat::Flac.default_quality()),
            Some("-compression_level 5")
        );
        assert_eq!(
            AudioFormat::Opus.quality_args(AudioFormat::Opus.default_quality()),
            Some("-compression_level 5")
        );
        assert_eq!(AudioFormat::Wav.default_quality(), AUTO);
    }

    #[test]
    fn test_unknown_format_is_error() {
        assert!(matches!(
            "ape".parse::<AudioFormat>(),
            Err(JobFileError::UnknownFormat(name)) if name == "ape"
        ));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!(" opus ".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
    }

    #[test]
    fn test_quality_lookup() {
        assert_eq!(AudioFormat::Flac.quality_args("Standard quality"), Some("-compression_level 5"));
        assert_eq!(AudioFormat::Ogg.quality_args("very good quality"), Some("-aq 10"));
        assert_eq!(
            AudioFormat::Mp3.quality_args("CBR 320 kbit/s (very good quality)"),
            Some("-b:a 320k")
        );
        assert_eq!(AudioFormat::Opus.quality_args(AUTO), Some(""));
        assert_eq!(AudioFormat::Mp3.quality_args("quality 3"), None);
    }

    #[test]
    fn test_every_format_starts_with_auto() {
        for format in AudioFormat::ALL {
            assert_eq!(format.presets()[0], (AUTO, ""));
        }
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&AudioFormat::Opus).unwrap();
        assert_eq!(json, "\"opus\"");
    }
}
