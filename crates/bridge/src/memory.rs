//! In-process stream broker with consumer-group semantics.
//!
//! Mirrors the subset of Redis Streams the bridge uses: auto ids, groups with a
//! last-delivered cursor and a pending list, blocking group reads, approximate
//! trim (implemented as an exact trim, which the approximate contract allows).
//! Used by tests and by `streambot run --memory`.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use streambot_core::error::StreamError;
use streambot_core::stream::{InboundEntry, NEW_ENTRIES_ONLY, StreamClient, StreamFields};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    fn parse(raw: &str) -> Result<Self, StreamError> {
        let (ms, seq) = raw.split_once('-').unwrap_or((raw, "0"));
        let ms = ms
            .parse()
            .map_err(|_| StreamError::Broker(format!("Invalid stream ID specified: {raw}")))?;
        let seq = seq
            .parse()
            .map_err(|_| StreamError::Broker(format!("Invalid stream ID specified: {raw}")))?;
        Ok(Self { ms, seq })
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Default)]
struct Group {
    last_delivered: EntryId,
    /// entry id → consumer it was delivered to
    pending: BTreeMap<EntryId, String>,
}

#[derive(Default)]
struct Stream {
    entries: VecDeque<(EntryId, Vec<(String, String)>)>,
    last_id: EntryId,
    groups: HashMap<String, Group>,
}

impl Stream {
    fn next_id(&mut self) -> EntryId {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        let id = if now > self.last_id.ms {
            EntryId { ms: now, seq: 0 }
        } else {
            EntryId {
                ms: self.last_id.ms,
                seq: self.last_id.seq + 1,
            }
        };
        self.last_id = id;
        id
    }
}

/// A `StreamClient` backed by process memory.
pub struct MemoryStreamClient {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Notify,
    open: AtomicBool,
}

impl Default for MemoryStreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStreamClient {
    /// Create a broker with no streams. The client starts disconnected.
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            appended: Notify::new(),
            open: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Stream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StreamError::NotConnected)
        }
    }

    /// Snapshot of every entry currently retained in `key`.
    pub fn entries(&self, key: &str) -> Vec<InboundEntry> {
        self.lock()
            .get(key)
            .map(|stream| {
                stream
                    .entries
                    .iter()
                    .map(|(id, fields)| InboundEntry {
                        id: id.to_string(),
                        fields: fields.iter().cloned().collect(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of entries delivered to `group` but not yet acknowledged.
    pub fn pending_count(&self, key: &str, group: &str) -> usize {
        self.lock()
            .get(key)
            .and_then(|stream| stream.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    pub fn has_group(&self, key: &str, group: &str) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|stream| stream.groups.contains_key(group))
    }

    fn try_read(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<InboundEntry>, StreamError> {
        let mut streams = self.lock();
        let nogroup = || {
            StreamError::Broker(format!(
                "NOGROUP No such key '{key}' or consumer group '{group}'"
            ))
        };
        let stream = streams.get_mut(key).ok_or_else(nogroup)?;
        let Stream {
            entries, groups, ..
        } = stream;
        let state = groups.get_mut(group).ok_or_else(nogroup)?;

        let delivered: Vec<InboundEntry> = entries
            .iter()
            .filter(|(id, _)| *id > state.last_delivered)
            .take(count)
            .map(|(id, fields)| InboundEntry {
                id: id.to_string(),
                fields: fields.iter().cloned().collect(),
            })
            .collect();

        for entry in &delivered {
            let id = EntryId::parse(&entry.id)?;
            state.last_delivered = id;
            state.pending.insert(id, consumer.to_string());
        }
        Ok(delivered)
    }
}

#[async_trait]
impl StreamClient for MemoryStreamClient {
    async fn connect(&self) -> Result<(), StreamError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StreamError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<InboundEntry>, StreamError> {
        self.ensure_open()?;
        let deadline = tokio::time::Instant::now() + block;

        loop {
            // Register interest before checking so an append in between is not missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let delivered = self.try_read(key, group, consumer, count)?;
            if !delivered.is_empty() {
                return Ok(delivered);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, key: &str, group: &str, id: &str) -> Result<u64, StreamError> {
        self.ensure_open()?;
        let id = EntryId::parse(id)?;
        let mut streams = self.lock();
        let removed = streams
            .get_mut(key)
            .and_then(|stream| stream.groups.get_mut(group))
            .and_then(|g| g.pending.remove(&id));
        Ok(u64::from(removed.is_some()))
    }

    async fn create_group(&self, key: &str, group: &str, start_id: &str) -> Result<(), StreamError> {
        self.ensure_open()?;
        let mut streams = self.lock();
        let stream = streams.entry(key.to_string()).or_default();
        if stream.groups.contains_key(group) {
            return Err(StreamError::GroupExists {
                group: group.to_string(),
            });
        }
        let last_delivered = if start_id == NEW_ENTRIES_ONLY {
            stream.last_id
        } else {
            EntryId::parse(start_id)?
        };
        stream.groups.insert(
            group.to_string(),
            Group {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        debug!(stream = %key, group = %group, start = %last_delivered, "Created consumer group");
        Ok(())
    }

    async fn trim(&self, key: &str, max_len: usize) -> Result<u64, StreamError> {
        self.ensure_open()?;
        let mut streams = self.lock();
        let Some(stream) = streams.get_mut(key) else {
            return Ok(0);
        };
        let excess = stream.entries.len().saturating_sub(max_len);
        stream.entries.drain(..excess);
        Ok(excess as u64)
    }

    async fn append(&self, key: &str, entry: &StreamFields) -> Result<String, StreamError> {
        self.ensure_open()?;
        let id = {
            let mut streams = self.lock();
            let stream = streams.entry(key.to_string()).or_default();
            let id = stream.next_id();
            stream.entries.push_back((id, entry.fields.clone()));
            id
        };
        self.appended.notify_waiters();
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(body: &str) -> StreamFields {
        let mut out = StreamFields::default();
        out.push("kind", "InboxEnvelope");
        out.push("body", body);
        out
    }

    async fn connected() -> MemoryStreamClient {
        let client = MemoryStreamClient::new();
        client.connect().await.unwrap();
        client
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let client = MemoryStreamClient::new();
        assert!(!client.is_open());
        let err = client.append("inbox", &entry("hi")).await.unwrap_err();
        assert!(matches!(err, StreamError::NotConnected));
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let client = connected().await;
        let a = client.append("inbox", &entry("1")).await.unwrap();
        let b = client.append("inbox", &entry("2")).await.unwrap();
        assert!(EntryId::parse(&b).unwrap() > EntryId::parse(&a).unwrap());
    }

    #[tokio::test]
    async fn group_created_at_tail_skips_history() {
        let client = connected().await;
        client.append("inbox", &entry("old")).await.unwrap();
        client.create_group("inbox", "g", NEW_ENTRIES_ONLY).await.unwrap();
        client.append("inbox", &entry("new")).await.unwrap();

        let read = client
            .read_group("inbox", "g", "c1", 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].field("body"), Some("new"));
    }

    #[tokio::test]
    async fn duplicate_group_is_reported() {
        let client = connected().await;
        client.create_group("inbox", "g", NEW_ENTRIES_ONLY).await.unwrap();
        let err = client.create_group("inbox", "g", NEW_ENTRIES_ONLY).await.unwrap_err();
        assert!(matches!(err, StreamError::GroupExists { .. }));
    }

    #[tokio::test]
    async fn read_without_group_fails() {
        let client = connected().await;
        let err = client
            .read_group("inbox", "missing", "c1", 1, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOGROUP"));
    }

    #[tokio::test]
    async fn delivered_entries_are_pending_until_acked() {
        let client = connected().await;
        client.create_group("inbox", "g", NEW_ENTRIES_ONLY).await.unwrap();
        client.append("inbox", &entry("a")).await.unwrap();

        let read = client
            .read_group("inbox", "g", "c1", 1, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(client.pending_count("inbox", "g"), 1);

        assert_eq!(client.ack("inbox", "g", &read[0].id).await.unwrap(), 1);
        assert_eq!(client.ack("inbox", "g", &read[0].id).await.unwrap(), 0);
        assert_eq!(client.pending_count("inbox", "g"), 0);

        // Never redelivered to the group
        let again = client
            .read_group("inbox", "g", "c2", 1, Duration::ZERO)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_read_times_out_empty() {
        let client = connected().await;
        client.create_group("inbox", "g", NEW_ENTRIES_ONLY).await.unwrap();
        let started = tokio::time::Instant::now();
        let read = client
            .read_group("inbox", "g", "c1", 1, Duration::from_millis(1000))
            .await
            .unwrap();
        assert!(read.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn blocking_read_wakes_on_append() {
        let client = Arc::new(connected().await);
        client.create_group("inbox", "g", NEW_ENTRIES_ONLY).await.unwrap();

        let reader = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .read_group("inbox", "g", "c1", 1, Duration::from_secs(5))
                    .await
            })
        };
        tokio::task::yield_now().await;
        client.append("inbox", &entry("late")).await.unwrap();

        let read = reader.await.unwrap().unwrap();
        assert_eq!(read[0].field("body"), Some("late"));
    }

    #[tokio::test]
    async fn trim_keeps_newest_entries() {
        let client = connected().await;
        for i in 0..5 {
            client.append("inbox", &entry(&i.to_string())).await.unwrap();
        }
        assert_eq!(client.trim("inbox", 2).await.unwrap(), 3);
        let left = client.entries("inbox");
        assert_eq!(left.len(), 2);
        assert_eq!(left[0].field("body"), Some("3"));
        assert_eq!(client.trim("absent", 2).await.unwrap(), 0);
    }
}
