// ABOUTME: Format registry constants for scan session files: header marker, schema version, extension.
// ABOUTME: Also provides the helper that appends the session extension to a chosen file name.

use std::path::{Path, PathBuf};

/// Leading marker every session file, legacy or current, must carry.
pub const HEADER: &str = "RTLSDR Scanner";

/// Schema version written by the encoder.
pub const VERSION: i64 = 9;

/// Extension of session files, including the leading dot.
pub const SAVE_EXTENSION: &str = ".rfs";

/// Append the session extension unless `path` already ends with it.
pub fn ensure_extension(path: &Path) -> PathBuf {
    let has_ext = path
        .extension()
        .map(|ext| ext.to_string_lossy() == SAVE_EXTENSION.trim_start_matches('.'))
        .unwrap_or(false);

    if has_ext {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(SAVE_EXTENSION);
        PathBuf::from(name)
    }
}
