//! Snapshot error types
//!
//! Everything that reaches a caller as `Err` aborts the run. Packages that are
//! simply missing from the index are not errors; they surface as
//! [`Resolution::Failed`](crate::resolver::Resolution::Failed) values and end up
//! in the snapshot's `failures` list.

use thiserror::Error;

/// Snapshot resolution errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Invalid or inconsistent configuration (e.g. unknown perl version)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The cpanfile or core-module table could not be read
    #[error("Invalid input: {0}")]
    ManifestInput(String),

    /// Downloaded archive does not match the index checksum
    #[error("Checksum mismatch for {package} ({url}): expected {expected}, got {actual}")]
    ChecksumMismatch {
        package: String,
        url: String,
        expected: String,
        actual: String,
    },

    /// Archive was recognized but is not a tar/gzip or zip file
    #[error("Unsupported archive format {format} for {package}")]
    UnsupportedFormat { package: String, format: String },

    /// Archive content matched no known signature
    #[error("Could not detect archive format for {package}")]
    UndetectableFormat { package: String },

    /// Archive is a known format but could not be read
    #[error("Failed to read archive for {package}: {message}")]
    Archive { package: String, message: String },

    /// HTTP transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A worker task panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl SnapshotError {
    /// Shorthand for archive read failures
    pub fn archive(package: &str, message: impl std::fmt::Display) -> Self {
        SnapshotError::Archive {
            package: package.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the error belongs to the integrity class (checksum or archive
    /// format). These are never worth retrying.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            SnapshotError::ChecksumMismatch { .. }
                | SnapshotError::UnsupportedFormat { .. }
                | SnapshotError::UndetectableFormat { .. }
        )
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for SnapshotError {
    fn from(e: reqwest::Error) -> Self {
        SnapshotError::Transport(e.to_string())
    }
}

impl From<tokio::task::JoinError> for SnapshotError {
    fn from(e: tokio::task::JoinError) -> Self {
        SnapshotError::Worker(e.to_string())
    }
}

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, SnapshotError>;
