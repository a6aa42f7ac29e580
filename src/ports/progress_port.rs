//! Progress notification port.
//!
//! A one-way, fire-and-forget side channel: the simulation writes into it
//! from inside the loop and never blocks on, or learns anything from, the
//! consumer. Send failures are ignored by design.

use std::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Status(String),
    Percent(u8),
}

pub trait ProgressSink {
    fn status(&self, message: &str);
    fn percent(&self, pct: u8);
}

/// Discards everything.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn status(&self, _message: &str) {}
    fn percent(&self, _pct: u8) {}
}

/// Forwards events to an outbound queue, decoupling the loop's pacing from
/// the consumer's.
pub struct ChannelProgress {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn status(&self, message: &str) {
        let _ = self.tx.send(ProgressEvent::Status(message.to_string()));
    }

    fn percent(&self, pct: u8) {
        let _ = self.tx.send(ProgressEvent::Percent(pct));
    }
}
