//! Source/destination pair comparison.
//!
//! The shallow check looks at existence and byte size only. A file rewritten
//! with different bytes of the same length compares as unchanged; only deep
//! verification (see [`crate::verify`]) detects that. Modification time is
//! never consulted.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::EngineError;

/// Result of a shallow comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Destination exists with the source's size
    Same,
    /// Destination does not exist
    Missing,
    /// Destination exists with a different size
    SizeMismatch { source: u64, destination: u64 },
    /// Destination exists but is a directory or other non-regular file
    NotAFile,
}

/// Compare `src` and `dst` by existence and size.
///
/// # Errors
/// Returns `EngineError::MetadataError` if `src` cannot be stat'ed, or if `dst`
/// exists but cannot be stat'ed. Both paths are stat'ed through symlinks.
pub fn compare_shallow(src: &Path, dst: &Path) -> Result<Comparison, EngineError> {
    let source = fs::metadata(src)
        .map_err(|e| EngineError::MetadataError {
            path: src.to_path_buf(),
            source: e,
        })?
        .len();

    let destination = match fs::metadata(dst) {
        Ok(metadata) if !metadata.is_file() => return Ok(Comparison::NotAFile),
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Comparison::Missing),
        Err(e) => {
            return Err(EngineError::MetadataError {
                path: dst.to_path_buf(),
                source: e,
            })
        }
    };

    if source == destination {
        Ok(Comparison::Same)
    } else {
        Ok(Comparison::SizeMismatch {
            source,
            destination,
        })
    }
}

/// True iff `dst` exists and has the same size as `src`.
pub fn same(src: &Path, dst: &Path) -> Result<bool, EngineError> {
    Ok(compare_shallow(src, dst)? == Comparison::Same)
}
