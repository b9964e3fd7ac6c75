//! Bridge identity and tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which streams and group identity a bridge instance uses. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Inbox stream the bridge reads from
    pub stream_name: String,

    /// Outbox stream replies and sends are appended to
    pub outbox_stream_name: String,

    /// Consumer group on the inbox stream
    pub group_name: String,

    /// This bridge's consumer name within the group
    pub consumer_name: String,
}

/// When the read cycle acknowledges an entry relative to dispatching it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Ack as soon as the entry is fetched. A crash during dispatch loses the entry.
    #[default]
    BeforeDispatch,
    /// Ack only once `receive` returned `Ok`. Failed dispatches stay pending in the group.
    AfterDispatch,
}

/// Shape of the outbound entry's message fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundFormat {
    /// A single serialized `envelope` field
    #[default]
    Nested,
    /// `sender`, `room` and `body` fields
    Flat,
}

/// Timing and policy knobs for the read loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// How long a group read blocks waiting for a new entry
    pub block: Duration,

    /// Pause after a failed cycle before the next read
    pub backoff: Duration,

    /// Approximate inbox length kept after bootstrap
    pub trim_max_len: usize,

    pub ack_policy: AckPolicy,

    pub outbound_format: OutboundFormat,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            block: Duration::from_millis(1000),
            backoff: Duration::from_millis(1000),
            trim_max_len: 1000,
            ack_policy: AckPolicy::default(),
            outbound_format: OutboundFormat::default(),
        }
    }
}
