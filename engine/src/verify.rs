//! Post-copy verification.
//!
//! Walks the *source* tree again and checks each file's mirror in the
//! destination. Files that exist only in the destination are never reported.
//! Per file, the first matching check wins:
//!
//! 1. destination missing, or not a regular file → [`DiscrepancyReason::Missing`]
//! 2. sizes differ → [`DiscrepancyReason::SizeMismatch`]
//! 3. deep mode only, digests differ → [`DiscrepancyReason::HashMismatch`]
//!
//! A file whose digest cannot be computed on either side is reported as a
//! message and left out of the result entirely, neither flagged nor confirmed.

use std::path::Path;

use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
use crate::compare::{compare_shallow, Comparison};
use crate::error::EngineError;
use crate::model::{BackupTask, Discrepancy, DiscrepancyReason, FileRef};
use crate::progress::EventSink;
use crate::walker::{walk_tree, WalkEntry};

/// How a verification pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Every source file was checked; discrepancies in traversal order
    Completed(Vec<Discrepancy>),
    /// The token tripped before the walk finished; partial findings are dropped
    Cancelled,
}

/// One verification pass over a task's trees.
pub struct Verifier<'a> {
    task: &'a BackupTask,
    algorithm: ChecksumAlgorithm,
    cancel: &'a CancellationToken,
}

impl<'a> Verifier<'a> {
    pub fn new(
        task: &'a BackupTask,
        algorithm: ChecksumAlgorithm,
        cancel: &'a CancellationToken,
    ) -> Self {
        Verifier {
            task,
            algorithm,
            cancel,
        }
    }

    /// Check every source file against its destination mirror.
    ///
    /// The token is polled before each directory and each file. A token that
    /// trips after the last file has been checked does not change the result.
    ///
    /// # Errors
    /// Returns an error only if the source root cannot be walked at all.
    pub fn verify(&self, deep: bool, sink: &dyn EventSink) -> Result<Verification, EngineError> {
        let mut discrepancies = Vec::new();

        for entry in walk_tree(&self.task.source)? {
            if self.cancel.is_cancelled() {
                return Ok(Verification::Cancelled);
            }

            let file = match entry {
                Ok(WalkEntry::File(file)) => file,
                Ok(WalkEntry::Dir { .. }) => continue,
                Ok(WalkEntry::Special(file)) => {
                    debug!(path = %file.absolute_path.display(), "not a regular file, not verified");
                    continue;
                }
                Err(e) => {
                    warn!("verification skipped an entry: {}", e);
                    continue;
                }
            };

            if let Some(reason) = self.check_file(&file, deep, sink) {
                debug!(path = %file.absolute_path.display(), %reason, "discrepancy");
                discrepancies.push(Discrepancy {
                    path: file.absolute_path,
                    reason,
                });
            }
        }

        Ok(Verification::Completed(discrepancies))
    }

    fn check_file(&self, file: &FileRef, deep: bool, sink: &dyn EventSink) -> Option<DiscrepancyReason> {
        let dst = self.task.destination_for(&file.relative_path);

        match compare_shallow(&file.absolute_path, &dst) {
            Ok(Comparison::Missing) | Ok(Comparison::NotAFile) => Some(DiscrepancyReason::Missing),
            Ok(Comparison::SizeMismatch { .. }) => Some(DiscrepancyReason::SizeMismatch),
            Ok(Comparison::Same) if deep => {
                let src_hash = self.hash_or_report(&file.absolute_path, sink);
                let dst_hash = self.hash_or_report(&dst, sink);
                hash_verdict(src_hash.as_ref(), dst_hash.as_ref())
            }
            Ok(Comparison::Same) => None,
            Err(e) => {
                warn!("{}", e);
                sink.on_message(&format!("Error checking {}: {}", file.absolute_path.display(), e));
                None
            }
        }
    }

    fn hash_or_report(&self, path: &Path, sink: &dyn EventSink) -> Option<ChecksumValue> {
        match compute_file_checksum(path, self.algorithm) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(os_error = ?e.raw_os_error(), "{}", e);
                sink.on_message(&format!("Error hashing {}: {}", path.display(), e));
                None
            }
        }
    }
}

/// Deep check of one pair. A pair with an unreadable side is neither flagged
/// nor confirmed.
fn hash_verdict(
    source: Option<&ChecksumValue>,
    destination: Option<&ChecksumValue>,
) -> Option<DiscrepancyReason> {
    match (source, destination) {
        (Some(a), Some(b)) if a != b => Some(DiscrepancyReason::HashMismatch),
        _ => None,
    }
}
