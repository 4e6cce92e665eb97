//! FFaudiocue job core
//!
//! Splits CUE-sheet audio images into tracks by running FFmpeg once per
//! track on a background worker, then moves the results into place.

pub mod conversion;
pub mod core;
pub mod error;
pub mod job_file;
pub mod logging;

#[cfg(test)]
mod test_fixtures;
