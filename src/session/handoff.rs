//! Single-slot handoff of "which session invoked this external operation".
//!
//! The consumer (an external interpreter adapter) reads the slot once,
//! synchronously, with no other signal of the invoking session. The publish
//! must therefore happen immediately before every external operation. The
//! slot is a bounded channel of capacity one owned by the coordinator, not
//! shared durable state: a publish while a previous operation is still in
//! flight is a protocol violation and fails fast instead of overwriting.

use crate::errors::DispatchError;
use std::sync::Mutex;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{Receiver, Sender, channel};

pub struct SessionHandoff {
    tx: Sender<String>,
    rx: Mutex<Receiver<String>>,
}

impl SessionHandoff {
    pub fn new() -> Self {
        let (tx, rx) = channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Publish the invoking session id. Fails with `HandoffBusy` when the
    /// previous publication has not been consumed yet; concurrent external
    /// operations from the same session must be serialized by the caller.
    pub fn publish(&self, session_id: &str) -> Result<(), DispatchError> {
        self.tx
            .try_send(session_id.to_string())
            .map_err(|_| DispatchError::HandoffBusy)
    }

    /// Consume the published session id, if any. Read-once semantics.
    pub fn take(&self) -> Option<String> {
        let mut rx = self.rx.lock().expect("handoff receiver lock");
        match rx.try_recv() {
            Ok(id) => Some(id),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

impl Default for SessionHandoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_then_take() {
        let handoff = SessionHandoff::new();
        handoff.publish("sess-a").unwrap();
        assert_eq!(handoff.take().as_deref(), Some("sess-a"));
        // Read-once: the slot is now empty
        assert!(handoff.take().is_none());
    }

    #[test]
    fn test_double_publish_fails_fast() {
        let handoff = SessionHandoff::new();
        handoff.publish("sess-a").unwrap();
        let err = handoff.publish("sess-b").unwrap_err();
        assert!(matches!(err, DispatchError::HandoffBusy));
        // The original publication is intact
        assert_eq!(handoff.take().as_deref(), Some("sess-a"));
    }

    #[test]
    fn test_take_empty_slot() {
        let handoff = SessionHandoff::new();
        assert!(handoff.take().is_none());
    }

    #[test]
    fn test_publish_after_consume_succeeds() {
        let handoff = SessionHandoff::new();
        handoff.publish("sess-a").unwrap();
        handoff.take();
        handoff.publish("sess-b").unwrap();
        assert_eq!(handoff.take().as_deref(), Some("sess-b"));
    }
}
