//! # Backup Engine - Differential Backup Library
//!
//! A headless differential backup engine. Given a source tree and a
//! destination tree it copies only files that are new or changed, skips files
//! already present with the same size, and optionally verifies the result.
//! Designed as the foundation for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! - Recursive, top-down directory traversal (via `walkdir`) that never follows symlinked directories
//! - Only regular files are copied; FIFOs, sockets and devices are skipped
//! - Size-based change detection (content is never inspected while copying)
//! - Copies with timestamps and permission bits
//! - Optional size-only or content-digest verification pass
//! - Progress, message and outcome events decoupled from UI technology
//! - Cooperative cancellation at directory and file boundaries
//!
//! ## Basic Usage
//!
//! ```no_run
//! use backup_engine::{spawn_backup, BackupTask, ChecksumAlgorithm, RunOutcome, VerifyMode};
//!
//! let task = BackupTask::new("/data/photos", "/mnt/backup/photos", VerifyMode::Deep);
//! let mut handle = spawn_backup(task, ChecksumAlgorithm::Md5);
//!
//! for snapshot in handle.progress().iter() {
//!     println!("{}/{}", snapshot.processed, snapshot.total);
//! }
//! for line in handle.messages().try_iter() {
//!     println!("{}", line);
//! }
//! assert_eq!(handle.wait(), RunOutcome::Done);
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (BackupTask, ProgressSnapshot, Discrepancy, enums)
//! - **error**: Error types and handling
//! - **walker**: Directory traversal
//! - **compare**: Shallow source/destination comparison
//! - **checksums**: Streaming content digests
//! - **fs_ops**: Directory creation and file copy
//! - **verify**: Post-copy verification pass
//! - **cancel**: Cancellation token
//! - **progress**: Event sink trait and channel implementation
//! - **backup**: The run state machine
//! - **worker**: Background execution and run handles

pub mod backup;
pub mod cancel;
pub mod checksums;
pub mod compare;
pub mod error;
pub mod fs_ops;
pub mod model;
pub mod progress;
pub mod verify;
pub mod walker;
pub mod worker;

// Re-export main types and functions
pub use backup::BackupEngine;
pub use cancel::CancellationToken;
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use error::EngineError;
pub use model::{
    BackupTask, Discrepancy, DiscrepancyReason, EngineState, FileRef, ProgressSnapshot,
    RunOutcome, VerifyMode,
};
pub use progress::{ChannelSink, EventReceivers, EventSink};
pub use verify::{Verification, Verifier};
pub use walker::{count_files, walk_tree, TreeWalk, WalkEntry};
pub use worker::{spawn_backup, spawn_engine, RunHandle};
