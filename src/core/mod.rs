//! Configuration-side building blocks
//!
//! This module contains:
//! - Application settings and their JSON persistence
//! - Output formats with their quality presets
//! - Detection of the external encoder binaries

mod binaries;
mod formats;
mod settings;

pub use binaries::{BinaryLocation, detect_binary, verify_executable};
pub use formats::{AUTO, AudioFormat};
pub use settings::AppSettings;

/// Sanitize a name for safe filesystem use
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("normal"), "normal");
        assert_eq!(sanitize_filename("with/slash"), "with_slash");
        assert_eq!(sanitize_filename("with:colon"), "with_colon");
        assert_eq!(sanitize_filename("AC/DC"), "AC_DC");
        assert_eq!(sanitize_filename("What?!"), "What_!");
    }
}
