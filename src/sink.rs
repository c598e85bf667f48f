//! Score event delivery
//!
//! The engine announces every smoothed score through a [`ScoreSink`]. Closures,
//! vectors and channel senders all work as sinks so hosts can pick whatever
//! fits their threading model.

use crate::types::ScoreEvent;
use std::sync::mpsc::Sender;
use tracing::warn;

/// Receiver of smoothed score announcements
pub trait ScoreSink {
    fn emit(&mut self, event: ScoreEvent);
}

impl<F> ScoreSink for F
where
    F: FnMut(ScoreEvent),
{
    fn emit(&mut self, event: ScoreEvent) {
        self(event)
    }
}

impl ScoreSink for Vec<ScoreEvent> {
    fn emit(&mut self, event: ScoreEvent) {
        self.push(event);
    }
}

impl ScoreSink for Sender<ScoreEvent> {
    fn emit(&mut self, event: ScoreEvent) {
        if self.send(event).is_err() {
            warn!("score receiver dropped, event discarded");
        }
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ScoreSink for NullSink {
    fn emit(&mut self, _event: ScoreEvent) {}
}
