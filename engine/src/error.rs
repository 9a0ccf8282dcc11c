//! Error types for the backup engine.
//!
//! The primary error type is `EngineError`. Only two conditions ever decide a
//! run's outcome (a missing source root and verification discrepancies); every
//! other `EngineError` is per-file and is turned into a message event by the
//! engine instead of aborting the run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by engine operations.
///
/// Note: EngineError wraps io::Error and is therefore neither Clone nor
/// Serialize. Convert to a string before sending it across a channel.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source root does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source root exists but is not a directory
    #[error("Source is not a directory: {}", path.display())]
    SourceNotDirectory { path: PathBuf },

    /// Failed to read from a file (copy source or hash input)
    #[error("Failed to read file: {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a destination file
    #[error("Failed to write file: {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to stat a file or apply its metadata
    #[error("Failed to access metadata: {}: {source}", path.display())]
    MetadataError { path: PathBuf, source: io::Error },

    /// Failed to list a directory
    #[error("Failed to enumerate directory: {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    #[error("Failed to create directory: {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Operation not allowed in the engine's current state
    #[error("Invalid engine state: {reason}")]
    InvalidState { reason: String },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::MetadataError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True if the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::SourceNotFound { .. } => true,
            Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::MetadataError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
