//! Environment variable helpers
//!
//! The tool is usually launched through a build system's `run` wrapper, which
//! moves the working directory and reports the user's original one in
//! `BUILD_WORKING_DIRECTORY`.

use std::path::{Path, PathBuf};

/// Environment variable holding a default core-module table path
pub const CORE_MODULES_ENV: &str = "CORE_MODULES";

/// Environment variable set by the build system to the invoking directory
pub const BUILD_WORKING_DIRECTORY_ENV: &str = "BUILD_WORKING_DIRECTORY";

/// Get environment variable as Option
///
/// Returns `Some(value)` if set and non-empty, `None` otherwise.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get environment variable as a path
pub fn env_path(key: &str) -> Option<PathBuf> {
    env_opt(key).map(PathBuf::from)
}

/// Make `path` absolute against `base` unless it already is
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
