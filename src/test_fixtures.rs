//! Test fixtures for job tests
//!
//! Fake encoder commands built from `sh -c` scripts, so runner and
//! sequencer tests behave like FFmpeg without needing it installed.

#![cfg(test)]

use std::path::Path;

use crate::conversion::TrackCommand;

/// Run `body` with `sh -c`
pub fn script(body: &str) -> TrackCommand {
    TrackCommand::new("sh", ["-c", body])
}

/// Quote a path for use inside a script
pub fn quoted(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// A track that reports progress at half and full length, then writes
/// `output` (relative to the working directory) with `content`
pub fn fake_track(output: &str, content: &str, duration_secs: u32) -> TrackCommand {
    let half_us = u64::from(duration_secs) * 500_000;
    let full_us = u64::from(duration_secs) * 1_000_000;
    script(&format!(
        "echo out_time_us={half_us}; echo frame=1 >&2; printf '%s' '{content}' > '{output}'; \
         echo out_time_us={full_us}; echo progress=end"
    ))
    .duration_secs(f64::from(duration_secs))
    .label(output)
}

/// A track that creates `marker` when it starts, then exits with `code`
pub fn marked_track(marker: &Path, code: i32) -> TrackCommand {
    script(&format!(
        "touch {}; echo out_time_us=1000000; exit {code}",
        quoted(marker)
    ))
    .duration_secs(1.0)
}

/// A track that creates `marker`, reports progress, then runs for a long time
pub fn slow_track(marker: &Path) -> TrackCommand {
    script(&format!(
        "touch {}; echo out_time_us=1000000; sleep 30; echo out_time_us=2000000",
        quoted(marker)
    ))
    .duration_secs(60.0)
}
