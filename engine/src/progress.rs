//! Event reporting.
//!
//! A run reports through a single ordered stream of `EngineEvent`s:
//! progress updates, at most one error, and exactly one terminal outcome.
//! The `EventSink` trait decouples the engine from whoever consumes them
//! (CLI, GUI, tests).

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// Progress update. `0/0` marks a plain status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    /// A status message with no numeric progress.
    pub fn status(message: impl Into<String>) -> Self {
        ProgressEvent {
            current: 0,
            total: 0,
            message: message.into(),
        }
    }

    pub fn is_status(&self) -> bool {
        self.current == 0 && self.total == 0
    }
}

/// Everything a run can report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    Progress(ProgressEvent),
    Error { message: String },
    /// Terminal; nothing follows it for the same run
    Outcome { success: bool },
}

impl EngineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::Outcome { .. })
    }
}

/// Receiver of engine events.
///
/// `emit` is called synchronously on the engine's worker, in order.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

impl EventSink for Sender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        // A dropped receiver just stops listening
        let _ = self.send(event);
    }
}
