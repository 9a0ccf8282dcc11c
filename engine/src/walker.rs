//! Recursive directory traversal.
//!
//! [`walk_tree`] yields the source tree top-down as [`WalkEntry`] items: the
//! root first, and every directory before its contents. It is built on
//! `walkdir` with links left unfollowed below the root, and a failing entry
//! only costs that entry: the rest of its directory and subtree is still
//! walked. Calling `walk_tree` again restarts the traversal from the root.
//!
//! A symlink that resolves to a regular file is listed as a file. One that
//! resolves to a directory is neither descended into nor listed, so cycles
//! cannot occur. FIFOs, sockets, device nodes and dangling links come back as
//! [`WalkEntry::Special`] and are never opened.
//!
//! Entry order inside a directory is whatever the platform's directory
//! enumeration produces.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::EngineError;
use crate::model::FileRef;

/// One item of a source tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEntry {
    /// A directory; `relative` is empty for the root itself
    Dir { relative: PathBuf, absolute: PathBuf },

    /// A regular file, or a symlink to one
    File(FileRef),

    /// Anything else that is not a directory
    Special(FileRef),
}

/// Lazy top-down traversal created by [`walk_tree`].
///
/// Yields `Err(EngineError::EnumerationFailed)` for an entry or directory that
/// cannot be read and then continues with the rest of the tree.
pub struct TreeWalk {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

impl std::fmt::Debug for TreeWalk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalk").field("root", &self.root).finish()
    }
}

/// Start walking `root`.
///
/// # Errors
/// Returns `EngineError::SourceNotFound` if `root` does not exist and
/// `EngineError::SourceNotDirectory` if it is not a directory. This is checked
/// once here, not per entry.
pub fn walk_tree(root: &Path) -> Result<TreeWalk, EngineError> {
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => Ok(TreeWalk {
            root: root.to_path_buf(),
            inner: WalkDir::new(root)
                .follow_links(false)
                .follow_root_links(true)
                .into_iter(),
        }),
        Ok(_) => Err(EngineError::SourceNotDirectory {
            path: root.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: root.to_path_buf(),
        }),
        Err(e) => Err(EngineError::EnumerationFailed {
            path: root.to_path_buf(),
            source: e,
        }),
    }
}

/// Count every regular file reachable from `root`. Unreadable entries are skipped.
pub fn count_files(root: &Path) -> Result<u64, EngineError> {
    let mut total = 0u64;
    for entry in walk_tree(root)? {
        match entry {
            Ok(WalkEntry::File(_)) => total += 1,
            Ok(_) => {}
            Err(e) => warn!("{}", e),
        }
    }
    Ok(total)
}

impl TreeWalk {
    /// Classify one entry. `None` means the entry is a symlinked directory.
    fn classify(&self, entry: walkdir::DirEntry) -> Result<Option<WalkEntry>, EngineError> {
        let relative = entry
            .path()
            .strip_prefix(&self.root)
            .map_err(|_| EngineError::InvalidState {
                reason: format!(
                    "walk of {} produced {}",
                    self.root.display(),
                    entry.path().display()
                ),
            })?
            .to_path_buf();
        let file_type = entry.file_type();
        let absolute = entry.into_path();

        if file_type.is_dir() {
            return Ok(Some(WalkEntry::Dir { relative, absolute }));
        }

        let is_regular = if file_type.is_symlink() {
            match fs::metadata(&absolute) {
                Ok(target) if target.is_dir() => return Ok(None),
                Ok(target) => target.is_file(),
                Err(_) => false,
            }
        } else {
            file_type.is_file()
        };

        let file = FileRef {
            relative_path: relative,
            absolute_path: absolute,
        };
        Ok(Some(if is_regular {
            WalkEntry::File(file)
        } else {
            WalkEntry::Special(file)
        }))
    }
}

impl Iterator for TreeWalk {
    type Item = Result<WalkEntry, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(self.root.as_path()).to_path_buf();
                    return Some(Err(EngineError::EnumerationFailed {
                        path,
                        source: io::Error::from(e),
                    }));
                }
            };

            match self.classify(entry) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
