//! Bridge signals: what the host can observe about a running bridge.
//!
//! Failures never travel back to whoever produced a stream entry; they surface
//! here (and in the logs) instead.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::message::Envelope;

/// Non-fatal anomalies worth a host's attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BridgeWarning {
    /// The broker acknowledged something other than exactly one entry.
    /// The entry was still dispatched.
    AckMismatch { entry_id: String, acked: u64 },

    /// Post-bootstrap trim failed; retention is unbounded until the next start.
    TrimFailed { stream: String, reason: String },
}

impl std::fmt::Display for BridgeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeWarning::AckMismatch { entry_id, acked } => {
                write!(f, "Acknowledgment of {entry_id} returned {acked}")
            }
            BridgeWarning::TrimFailed { stream, reason } => {
                write!(f, "Failed to trim {stream}: {reason}")
            }
        }
    }
}

/// Informational notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BridgeInfo {
    /// Group creation failed. `already_exists` is the normal restart case.
    GroupCreateFailed {
        group: String,
        already_exists: bool,
        reason: String,
    },
}

impl std::fmt::Display for BridgeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeInfo::GroupCreateFailed { reason, .. } => {
                write!(f, "Failed to create consumer group: {reason}")
            }
        }
    }
}

/// All signals a bridge emits.
#[derive(Debug, Clone, Serialize)]
pub enum BridgeSignal {
    /// The read loop has been launched
    Connected { adapter: String },

    Warning(BridgeWarning),

    Info(BridgeInfo),

    /// A reply was appended to the outbox
    Reply {
        envelope: Envelope,
        strings: Vec<String>,
    },
}

/// A broadcast-based bus for bridge signals.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct SignalBus {
    sender: broadcast::Sender<Arc<BridgeSignal>>,
}

impl SignalBus {
    /// Create a new signal bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a signal to all subscribers.
    pub fn publish(&self, signal: BridgeSignal) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(signal));
    }

    /// Subscribe to receive signals.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BridgeSignal>> {
        self.sender.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_bus_publish_subscribe() {
        let bus = SignalBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(BridgeSignal::Warning(BridgeWarning::AckMismatch {
            entry_id: "1-0".into(),
            acked: 0,
        }));

        let signal = rx.recv().await.unwrap();
        match signal.as_ref() {
            BridgeSignal::Warning(BridgeWarning::AckMismatch { entry_id, acked }) => {
                assert_eq!(entry_id, "1-0");
                assert_eq!(*acked, 0);
            }
            other => panic!("Expected AckMismatch warning, got {other:?}"),
        }
    }

    #[test]
    fn signal_bus_no_subscribers_doesnt_panic() {
        let bus = SignalBus::new(16);
        bus.publish(BridgeSignal::Connected {
            adapter: "test".into(),
        });
    }

    #[test]
    fn info_displays_reason() {
        let info = BridgeInfo::GroupCreateFailed {
            group: "g".into(),
            already_exists: true,
            reason: "BUSYGROUP".into(),
        };
        assert!(info.to_string().contains("BUSYGROUP"));
    }
}
