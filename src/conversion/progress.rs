//! FFmpeg progress line parsing
//!
//! FFmpeg run with `-progress pipe:1` writes `key=value` lines. The only key
//! we care about is `out_time_us`, the elapsed output time in microseconds.
//! Older builds also emit `out_time_ms`, which despite the name carries
//! microseconds as well.

use std::time::Duration;

const PROGRESS_KEYS: [&str; 2] = ["out_time_us=", "out_time_ms="];

/// One elapsed-time reading taken from a progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Raw microsecond counter as printed by the encoder
    pub elapsed_us: u64,
}

impl ProgressSample {
    /// Elapsed time in whole seconds, rounded to nearest
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_us.saturating_add(500_000) / 1_000_000
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us)
    }
}

/// Extract a progress sample from one line of encoder output
///
/// Returns `None` for anything that is not a well-formed progress marker.
/// Never panics, whatever the input.
pub fn parse(line: &str) -> Option<ProgressSample> {
    line.split_whitespace().find_map(|token| {
        PROGRESS_KEYS.iter().find_map(|key| {
            token
                .strip_prefix(key)
                .and_then(|value| value.parse::<u64>().ok())
                .map(|elapsed_us| ProgressSample { elapsed_us })
        })
    })
}

/// Percentage of a track done, clamped to 0..=100
///
/// A zero, negative or non-finite total yields 0 instead of dividing by it.
pub fn percent(elapsed_secs: u64, total_secs: f64) -> u8 {
    if !total_secs.is_finite() || total_secs <= 0.0 {
        return 0;
    }
    let ratio = (elapsed_secs as f64 / total_secs * 100.0).round();
    ratio.clamp(0.0, 100.0) as u8
}
