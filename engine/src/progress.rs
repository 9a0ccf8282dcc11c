//! Event reporting.
//!
//! This module defines the EventSink trait, which decouples the engine from
//! any specific UI technology. A run produces three streams:
//! - progress snapshots, one per processed file during the copy phase
//! - free-text message lines (lifecycle notices, per-file errors, findings)
//! - exactly one terminal outcome, after which nothing else is emitted
//!
//! [`ChannelSink`] forwards all three over `crossbeam-channel` so a consumer on
//! another thread can observe a run.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::model::{ProgressSnapshot, RunOutcome};

/// Receives events from a backup run.
///
/// All methods are called synchronously on the thread executing the run.
pub trait EventSink: Send {
    /// Called after every file processed in the copy phase.
    fn on_progress(&self, snapshot: ProgressSnapshot);

    /// Called for lifecycle milestones, per-file errors and verification findings.
    fn on_message(&self, message: &str);

    /// Called exactly once when the run reaches a terminal state.
    fn on_finished(&self, outcome: RunOutcome);
}

/// Receiving halves of a [`ChannelSink`].
#[derive(Debug, Clone)]
pub struct EventReceivers {
    pub progress: Receiver<ProgressSnapshot>,
    pub messages: Receiver<String>,
    pub outcome: Receiver<RunOutcome>,
}

/// An EventSink implementation that sends events over unbounded channels.
///
/// Send failures (the consumer went away) are ignored; the run continues.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    progress: Sender<ProgressSnapshot>,
    messages: Sender<String>,
    outcome: Sender<RunOutcome>,
}

impl ChannelSink {
    pub fn new() -> (Self, EventReceivers) {
        let (progress_tx, progress_rx) = unbounded();
        let (message_tx, message_rx) = unbounded();
        let (outcome_tx, outcome_rx) = unbounded();

        (
            ChannelSink {
                progress: progress_tx,
                messages: message_tx,
                outcome: outcome_tx,
            },
            EventReceivers {
                progress: progress_rx,
                messages: message_rx,
                outcome: outcome_rx,
            },
        )
    }
}

impl EventSink for ChannelSink {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        let _ = self.progress.send(snapshot);
    }

    fn on_message(&self, message: &str) {
        let _ = self.messages.send(message.to_string());
    }

    fn on_finished(&self, outcome: RunOutcome) {
        let _ = self.outcome.send(outcome);
    }
}
