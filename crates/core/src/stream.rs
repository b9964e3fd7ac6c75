//! StreamClient trait: the abstraction over the stream broker.
//!
//! A StreamClient exposes the handful of consumer-group operations the bridge
//! needs over two named streams (inbox and outbox). The wire protocol and
//! storage engine stay behind this trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::StreamError;

/// Start id meaning "deliver only entries appended after group creation".
pub const NEW_ENTRIES_ONLY: &str = "$";

/// An entry read from the inbox stream. Consumed once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEntry {
    /// Broker-assigned id, monotonic within the stream
    pub id: String,

    /// Field map as written by the producer
    pub fields: HashMap<String, String>,
}

impl InboundEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The entry's kind tag (empty when the producer omitted it).
    pub fn kind(&self) -> &str {
        self.field("kind").unwrap_or_default()
    }
}

/// The ordered field/value pairs of one stream entry, as appended to the
/// inbox by producers or to the outbox by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamFields {
    pub fields: Vec<(String, String)>,
}

impl StreamFields {
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The broker client the bridge drives.
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Open the connection.
    async fn connect(&self) -> Result<(), StreamError>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<(), StreamError>;

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;

    /// Read at most `count` never-delivered entries for `consumer` in `group`,
    /// blocking up to `block` when none are available. Empty on timeout.
    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<InboundEntry>, StreamError>;

    /// Acknowledge an entry; returns how many entries the broker acknowledged.
    async fn ack(&self, key: &str, group: &str, id: &str) -> Result<u64, StreamError>;

    /// Create `group` on `key` at `start_id`, creating the stream if absent.
    /// Fails with [`StreamError::GroupExists`] when the group is already there.
    async fn create_group(&self, key: &str, group: &str, start_id: &str) -> Result<(), StreamError>;

    /// Trim `key` to roughly `max_len` entries; returns how many were evicted.
    async fn trim(&self, key: &str, max_len: usize) -> Result<u64, StreamError>;

    /// Append an entry with a broker-assigned id; returns that id.
    async fn append(&self, key: &str, entry: &StreamFields) -> Result<String, StreamError>;
}
