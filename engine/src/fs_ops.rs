//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Creating destination directories recursively
//! - Copying files with metadata preservation
//!
//! Copies are written in place. A crash mid-copy leaves a partially written
//! destination file behind; the next run sees a size mismatch and copies it
//! again.

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;

use crate::error::EngineError;

/// Copy a file from source to destination with metadata preservation.
///
/// Parent directories of `dst` are created first. An existing `dst` is
/// overwritten. Access time, modification time and permission bits are copied
/// from `src` after the content.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns EngineError if any step fails; a failed copy may leave a partial `dst`.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::MetadataError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;
    drop(dst_file);

    copy_metadata(&src_metadata, dst)?;

    Ok(bytes_copied)
}

/// Apply `src_metadata`'s timestamps and permission bits to `dst`.
fn copy_metadata(src_metadata: &fs::Metadata, dst: &Path) -> Result<(), EngineError> {
    let metadata_error = |e| EngineError::MetadataError {
        path: dst.to_path_buf(),
        source: e,
    };

    let atime = FileTime::from_last_access_time(src_metadata);
    let mtime = FileTime::from_last_modification_time(src_metadata);
    filetime::set_file_times(dst, atime, mtime).map_err(metadata_error)?;

    // Last, so a read-only source doesn't block the timestamp update.
    fs::set_permissions(dst, src_metadata.permissions()).map_err(metadata_error)?;

    Ok(())
}

/// Create `dir` and all of its missing ancestors. Succeeds if it already exists.
pub fn ensure_dir(dir: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(dir).map_err(|e| EngineError::DirectoryCreationFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if the parent exists as a non-directory or cannot be created.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => ensure_dir(parent),
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_file_with_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, b"test content").expect("Failed to write source");

        let bytes = copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(&dst_file).expect("Failed to read dest");
        assert_eq!(content, "test content");
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("old.txt");
        let dst_file = temp_dir.path().join("copy.txt");
        fs::write(&src_file, b"aged").expect("Failed to write source");

        let past = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&src_file, past).expect("Failed to set mtime");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");

        let dst_meta = fs::metadata(&dst_file).expect("Failed to stat dest");
        assert_eq!(FileTime::from_last_modification_time(&dst_meta), past);
    }

    #[test]
    fn test_copy_overwrites_existing_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("new.txt");
        let dst_file = temp_dir.path().join("existing.txt");
        fs::write(&src_file, b"new").expect("Failed to write source");
        fs::write(&dst_file, b"much longer old content").expect("Failed to write dest");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(fs::read(&dst_file).expect("Failed to read dest"), b"new");
    }

    #[test]
    fn test_copy_creates_missing_parents() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("a").join("b").join("dest.txt");
        fs::write(&src_file, b"nested").expect("Failed to write source");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert!(dst_file.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("script.sh");
        let dst_file = temp_dir.path().join("script-copy.sh");
        fs::write(&src_file, b"#!/bin/sh\n").expect("Failed to write source");
        fs::set_permissions(&src_file, fs::Permissions::from_mode(0o750))
            .expect("Failed to chmod");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");

        let mode = fs::metadata(&dst_file).expect("Failed to stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = copy_file_with_metadata(
            &temp_dir.path().join("absent"),
            &temp_dir.path().join("dest"),
        );
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(temp_dir.path().join("subdir").is_dir());
    }

    #[test]
    fn test_ensure_parent_rejects_file_parent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"not a dir").expect("Failed to write file");

        let result = ensure_parent_dir_exists(&blocker.join("child.txt"));
        assert!(matches!(result, Err(EngineError::DirectoryCreationFailed { .. })));
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("x").join("y");
        ensure_dir(&dir).expect("first create");
        ensure_dir(&dir).expect("second create");
        assert!(dir.is_dir());
    }
}
