//! Background execution of a backup run.
//!
//! [`spawn_backup`] moves a [`BackupEngine`] onto its own thread and hands back
//! a [`RunHandle`] for observing and cancelling it. The caller's thread never
//! blocks on filesystem work.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::error;

use crate::backup::BackupEngine;
use crate::cancel::CancellationToken;
use crate::checksums::ChecksumAlgorithm;
use crate::model::{BackupTask, ProgressSnapshot, RunOutcome};
use crate::progress::{ChannelSink, EventReceivers, EventSink};

/// Caller-side handle to a run executing on a worker thread.
#[derive(Debug)]
pub struct RunHandle {
    receivers: EventReceivers,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

/// Start a backup of `task` on a dedicated worker thread.
pub fn spawn_backup(task: BackupTask, algorithm: ChecksumAlgorithm) -> RunHandle {
    let engine = BackupEngine::new(task).with_checksum_algorithm(algorithm);
    spawn_engine(engine)
}

/// Run an already configured idle engine on a dedicated worker thread.
pub fn spawn_engine(mut engine: BackupEngine) -> RunHandle {
    let (sink, receivers) = ChannelSink::new();
    let cancel = engine.cancellation_token();

    let worker = thread::spawn(move || {
        if let Err(e) = engine.run(&sink) {
            // Only reachable with a non-idle engine; still owe the caller a terminal event.
            error!("backup could not start: {}", e);
            sink.on_message(&format!("Error: {}", e));
            sink.on_finished(RunOutcome::Error);
        }
    });

    RunHandle {
        receivers,
        cancel,
        worker: Some(worker),
    }
}

impl RunHandle {
    /// Request cancellation. Safe to call any number of times, even after the run ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> &Receiver<ProgressSnapshot> {
        &self.receivers.progress
    }

    pub fn messages(&self) -> &Receiver<String> {
        &self.receivers.messages
    }

    pub fn outcome(&self) -> &Receiver<RunOutcome> {
        &self.receivers.outcome
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Block until the worker exits and return the terminal outcome.
    ///
    /// Progress and message events not yet consumed stay available on the
    /// receivers. A worker that panicked is reported as `RunOutcome::Error`.
    pub fn wait(&mut self) -> RunOutcome {
        if !self.join() {
            return RunOutcome::Error;
        }
        self.receivers.outcome.try_recv().unwrap_or(RunOutcome::Error)
    }

    /// Block until the worker exits without touching the outcome channel.
    ///
    /// Returns false if the worker panicked.
    pub fn join(&mut self) -> bool {
        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(()) => true,
                Err(_) => {
                    error!("backup worker panicked");
                    false
                }
            },
            None => true,
        }
    }
}
