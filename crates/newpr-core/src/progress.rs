//! Progress-event interface.
//!
//! One [`ProgressEvent`] per phase transition, plus intermediate
//! per-commit/per-group ticks, delivered in order over an `mpsc::Sender` so
//! a caller can stream progress to a UI. Tests collect events into a
//! `Vec` instead of wiring up a channel.

use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

use crate::execute::RunPhase;

/// One progress update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Monotonically increasing within a run, starting at 0.
    pub id: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// The phase this event was emitted during.
    pub phase: RunPhase,
    /// Human-readable status line.
    pub message: String,
}

/// Emits [`ProgressEvent`]s to a channel, assigning sequential ids.
///
/// Dropping the paired `Receiver` (or any send failure) is treated as "no
/// one is listening" and silently ignored — progress reporting is
/// best-effort and must never fail the pipeline.
pub struct ProgressEmitter {
    sender: Sender<ProgressEvent>,
    next_id: u64,
}

impl ProgressEmitter {
    #[must_use]
    pub const fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender, next_id: 0 }
    }

    /// Emit one event at `phase` with `message`, using `now` as the
    /// timestamp (callers supply wall-clock time; this module never reads
    /// it itself).
    pub fn emit(&mut self, phase: RunPhase, message: impl Into<String>, now: u64) {
        let event = ProgressEvent {
            id: self.next_id,
            timestamp: now,
            phase,
            message: message.into(),
        };
        self.next_id += 1;
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn emitted_events_have_sequential_ids() {
        let (tx, rx) = channel();
        let mut emitter = ProgressEmitter::new(tx);
        emitter.emit(RunPhase::Partitioning, "starting", 100);
        emitter.emit(RunPhase::Planning, "planning", 101);

        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert_eq!(first.message, "starting");
        assert_eq!(second.phase, RunPhase::Planning);
    }

    #[test]
    fn emit_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = channel();
        drop(rx);
        let mut emitter = ProgressEmitter::new(tx);
        emitter.emit(RunPhase::Done, "done", 200);
    }
}
