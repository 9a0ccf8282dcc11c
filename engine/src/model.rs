//! Core data model for backup runs.
//!
//! This module defines the main data structures for representing one backup pass:
//! - BackupTask: what to back up and how to verify it
//! - FileRef: a single file found while walking a tree
//! - ProgressSnapshot: counters reported after every processed file
//! - Discrepancy: a verification finding
//! - RunOutcome, EngineState: the engine lifecycle

use std::fmt;
use std::path::{Path, PathBuf};

/// A fully resolved backup task.
///
/// Immutable for the duration of one run. The engine never prompts for or
/// rewrites these paths; callers hand in absolute, already-resolved paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTask {
    /// Root of the tree to back up
    pub source: PathBuf,

    /// Root of the mirrored tree
    pub destination: PathBuf,

    /// What to check after the copy phase
    pub verify_mode: VerifyMode,
}

impl BackupTask {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        source: P,
        destination: Q,
        verify_mode: VerifyMode,
    ) -> Self {
        BackupTask {
            source: source.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
            verify_mode,
        }
    }

    /// Destination path mirroring `relative` (a path relative to the source root).
    pub fn destination_for(&self, relative: &Path) -> PathBuf {
        self.destination.join(relative)
    }
}

/// Post-copy verification strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// No verification pass
    #[default]
    None,
    /// Existence and byte size only
    SizeOnly,
    /// Existence, byte size and content digest
    Deep,
}

impl VerifyMode {
    /// Parse a mode from its command-line spelling.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "size" | "size-only" | "sizeonly" => Some(Self::SizeOnly),
            "deep" | "hash" | "checksum" => Some(Self::Deep),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, VerifyMode::None)
    }
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyMode::None => write!(f, "none"),
            VerifyMode::SizeOnly => write!(f, "size"),
            VerifyMode::Deep => write!(f, "deep"),
        }
    }
}

/// A regular file found by the tree walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Path relative to the walked root
    pub relative_path: PathBuf,

    /// Absolute path on disk
    pub absolute_path: PathBuf,
}

/// Counters for one run, reported after every processed file.
///
/// `processed == copied + skipped + failed` holds for every snapshot the
/// engine emits, and `total` is fixed before the first file is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total: u64,
    pub processed: u64,
}

impl ProgressSnapshot {
    pub fn new(total: u64) -> Self {
        ProgressSnapshot {
            total,
            ..Default::default()
        }
    }

    /// Whole-number completion percentage, 0 while nothing is known.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.processed as f64 / self.total as f64) * 100.0) as u32
    }

    pub(crate) fn record_copied(&mut self) {
        self.copied += 1;
        self.processed += 1;
    }

    pub(crate) fn record_skipped(&mut self) {
        self.skipped += 1;
        self.processed += 1;
    }

    pub(crate) fn record_failed(&mut self) {
        self.failed += 1;
        self.processed += 1;
    }
}

/// Why a file failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscrepancyReason {
    /// Destination file does not exist
    Missing,
    /// Destination size differs from the source
    SizeMismatch,
    /// Same size, different content digest
    HashMismatch,
}

impl fmt::Display for DiscrepancyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyReason::Missing => write!(f, "missing"),
            DiscrepancyReason::SizeMismatch => write!(f, "size mismatch"),
            DiscrepancyReason::HashMismatch => write!(f, "hash mismatch"),
        }
    }
}

/// A single file-level verification finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    /// Source path of the offending file
    pub path: PathBuf,
    pub reason: DiscrepancyReason,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.path.display())
    }
}

/// Terminal state of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Error,
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Done => write!(f, "done"),
            RunOutcome::Error => write!(f, "error"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of a [`BackupEngine`](crate::BackupEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, not yet started
    Idle,
    /// Counting source files
    Scanning,
    /// Copying changed files
    Copying,
    /// Checking the destination against the source
    Verifying,
    /// Run finished; sticky until reset
    Finished(RunOutcome),
}

impl EngineState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Finished(_))
    }
}
