//! Backup orchestration.
//!
//! [`BackupEngine`] drives one run through
//! `Idle → Scanning → Copying → (Verifying) → Finished`:
//!
//! - Scanning walks the source once to fix `total`.
//! - Copying walks it again, mirrors every directory, and copies each file
//!   whose destination is missing or differs in size.
//! - Verifying (only when requested and not cancelled) re-walks the source and
//!   reports discrepancies; any discrepancy turns the outcome into `Error`.
//!
//! Per-file failures are reported as messages and never abort the run. The
//! terminal outcome is emitted exactly once, after every other event.

use std::time::Instant;

use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::checksums::ChecksumAlgorithm;
use crate::compare;
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{BackupTask, EngineState, FileRef, ProgressSnapshot, RunOutcome, VerifyMode};
use crate::progress::EventSink;
use crate::verify::{Verification, Verifier};
use crate::walker::{count_files, walk_tree, WalkEntry};

/// How a phase ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseEnd {
    Completed,
    Cancelled,
}

/// Single-use engine for one backup run.
#[derive(Debug)]
pub struct BackupEngine {
    id: Uuid,
    task: BackupTask,
    algorithm: ChecksumAlgorithm,
    cancel: CancellationToken,
    state: EngineState,
    progress: ProgressSnapshot,
}

impl BackupEngine {
    /// Create an idle engine for `task` with MD5 deep verification and a fresh token.
    pub fn new(task: BackupTask) -> Self {
        BackupEngine {
            id: Uuid::new_v4(),
            task,
            algorithm: ChecksumAlgorithm::default(),
            cancel: CancellationToken::new(),
            state: EngineState::Idle,
            progress: ProgressSnapshot::default(),
        }
    }

    /// Digest used by `VerifyMode::Deep`.
    pub fn with_checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Poll `cancel` instead of the engine's own token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task(&self) -> &BackupTask {
        &self.task
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Counters as of the last processed file.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress
    }

    /// A handle that cancels this engine's current or next run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Return a finished engine to `Idle` so it can run again.
    ///
    /// The old token may already be tripped, so a new one is required.
    pub fn reset(&mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        if !self.state.is_terminal() {
            return Err(EngineError::InvalidState {
                reason: format!("cannot reset an engine in state {:?}", self.state),
            });
        }
        self.id = Uuid::new_v4();
        self.cancel = cancel;
        self.state = EngineState::Idle;
        self.progress = ProgressSnapshot::default();
        Ok(())
    }

    /// Execute one full run, reporting to `sink`.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidState` if the engine is not `Idle`. Every
    /// other failure is reported through `sink` and reflected in the outcome.
    pub fn run(&mut self, sink: &dyn EventSink) -> Result<RunOutcome, EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::InvalidState {
                reason: format!("engine must be Idle to run; current state: {:?}", self.state),
            });
        }

        let span = info_span!("backup", run_id = %self.id);
        let _enter = span.enter();
        let started = Instant::now();

        sink.on_message(&format!("Worker started for {}", self.task.source.display()));
        info!(
            source = %self.task.source.display(),
            destination = %self.task.destination.display(),
            verify = %self.task.verify_mode,
            "backup started"
        );

        let outcome = self.execute(sink);

        self.state = EngineState::Finished(outcome);
        info!(
            %outcome,
            copied = self.progress.copied,
            skipped = self.progress.skipped,
            failed = self.progress.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backup finished"
        );
        sink.on_finished(outcome);

        Ok(outcome)
    }

    fn execute(&mut self, sink: &dyn EventSink) -> RunOutcome {
        self.state = EngineState::Scanning;
        let total = match count_files(&self.task.source) {
            Ok(total) => total,
            Err(e) if e.is_not_found() => {
                sink.on_message("Error: Source folder not found!");
                return RunOutcome::Error;
            }
            Err(e) => {
                sink.on_message(&format!("Error: {}", e));
                return RunOutcome::Error;
            }
        };
        self.progress = ProgressSnapshot::new(total);
        debug!(total, "scan complete");

        self.state = EngineState::Copying;
        match self.copy_tree(sink) {
            Ok(PhaseEnd::Completed) => {}
            Ok(PhaseEnd::Cancelled) => return self.cancelled(sink),
            Err(e) => {
                sink.on_message(&format!("Error: {}", e));
                return RunOutcome::Error;
            }
        }

        if self.cancel.is_cancelled() {
            return self.cancelled(sink);
        }

        if self.task.verify_mode.is_enabled() {
            if let Some(outcome) = self.verify(sink) {
                return outcome;
            }
        }

        let mut summary = format!(
            "Backup complete. Copied: {}, Skipped: {}.",
            self.progress.copied, self.progress.skipped
        );
        if self.progress.failed > 0 {
            summary.push_str(&format!(" Failed: {}.", self.progress.failed));
        }
        sink.on_message(&summary);
        RunOutcome::Done
    }

    fn cancelled(&self, sink: &dyn EventSink) -> RunOutcome {
        sink.on_message("Backup process cancelled.");
        RunOutcome::Cancelled
    }

    fn copy_tree(&mut self, sink: &dyn EventSink) -> Result<PhaseEnd, EngineError> {
        for entry in walk_tree(&self.task.source)? {
            if self.cancel.is_cancelled() {
                return Ok(PhaseEnd::Cancelled);
            }

            match entry {
                Ok(WalkEntry::Dir { relative, .. }) => {
                    let dest_dir = self.task.destination_for(&relative);
                    if let Err(e) = fs_ops::ensure_dir(&dest_dir) {
                        // Files below still get their own attempt (and their own error).
                        warn!("{}", e);
                        sink.on_message(&format!("Error: {}", e));
                    }
                }
                Ok(WalkEntry::File(file)) => {
                    self.process_file(&file, sink);
                    sink.on_progress(self.progress);
                }
                Ok(WalkEntry::Special(file)) => {
                    warn!(path = %file.absolute_path.display(), "not a regular file, skipped");
                    sink.on_message(&format!(
                        "Skipping {}: not a regular file",
                        file.absolute_path.display()
                    ));
                }
                Err(e) => {
                    warn!("{}", e);
                    sink.on_message(&format!("Error: {}", e));
                }
            }
        }

        Ok(PhaseEnd::Completed)
    }

    /// Copy-or-skip a single file and update the counters.
    fn process_file(&mut self, file: &FileRef, sink: &dyn EventSink) {
        let src = &file.absolute_path;
        let dst = self.task.destination_for(&file.relative_path);

        let copied = compare::same(src, &dst).and_then(|same| {
            if same {
                Ok(false)
            } else {
                fs_ops::copy_file_with_metadata(src, &dst).map(|_| true)
            }
        });

        match copied {
            Ok(true) => {
                debug!(path = %file.relative_path.display(), "copied");
                self.progress.record_copied();
            }
            Ok(false) => {
                debug!(path = %file.relative_path.display(), "skipped");
                self.progress.record_skipped();
            }
            Err(e) => {
                warn!(path = %src.display(), error = %e, os_error = ?e.raw_os_error(), "file failed");
                if e.is_not_found() {
                    sink.on_message(&format!(
                        "Error processing {}: file disappeared during backup",
                        src.display()
                    ));
                } else {
                    sink.on_message(&format!("Error processing {}: {}", src.display(), e));
                }
                self.progress.record_failed();
            }
        }
    }

    /// Run the verification pass. `None` means verification passed.
    fn verify(&mut self, sink: &dyn EventSink) -> Option<RunOutcome> {
        self.state = EngineState::Verifying;
        sink.on_message(&format!(
            "Verification mode active: {}. Starting check...",
            self.task.verify_mode
        ));

        let deep = self.task.verify_mode == VerifyMode::Deep;
        let result = Verifier::new(&self.task, self.algorithm, &self.cancel).verify(deep, sink);

        match result {
            Ok(Verification::Cancelled) => Some(self.cancelled(sink)),
            Ok(Verification::Completed(discrepancies)) if discrepancies.is_empty() => {
                sink.on_message("Verification successful.");
                None
            }
            Ok(Verification::Completed(discrepancies)) => {
                sink.on_message(&format!(
                    "Verification failed: Found {} discrepancies!",
                    discrepancies.len()
                ));
                for discrepancy in &discrepancies {
                    sink.on_message(&format!("  - {}", discrepancy));
                }
                Some(RunOutcome::Error)
            }
            Err(e) => {
                sink.on_message(&format!("Error: {}", e));
                Some(RunOutcome::Error)
            }
        }
    }
}
