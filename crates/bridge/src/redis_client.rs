//! Redis Streams implementation of [`StreamClient`].
//!
//! Blocking group reads run on their own connection so that appends and acks
//! never queue behind an `XREADGROUP ... BLOCK`.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use streambot_core::error::StreamError;
use streambot_core::stream::{InboundEntry, StreamClient, StreamFields};
use tracing::{debug, info};

#[derive(Clone)]
struct Connections {
    reader: ConnectionManager,
    writer: ConnectionManager,
}

/// A `StreamClient` talking to a Redis server.
pub struct RedisStreamClient {
    client: redis::Client,
    connections: Mutex<Option<Connections>>,
}

impl RedisStreamClient {
    /// Validate `url` and build a disconnected client. No I/O happens until `connect`.
    pub fn open(url: &str) -> Result<Self, StreamError> {
        let client = redis::Client::open(url).map_err(broker_error)?;
        Ok(Self {
            client,
            connections: Mutex::new(None),
        })
    }

    fn connections(&self) -> Result<Connections, StreamError> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StreamError::NotConnected)
    }
}

fn broker_error(e: redis::RedisError) -> StreamError {
    StreamError::Broker(e.to_string())
}

fn decode_reply(reply: StreamReadReply) -> Result<Vec<InboundEntry>, StreamError> {
    reply
        .keys
        .into_iter()
        .flat_map(|key| key.ids)
        .map(|stream_id| {
            let fields = stream_id
                .map
                .iter()
                .map(|(name, value)| {
                    redis::from_redis_value::<String>(value)
                        .map(|v| (name.clone(), v))
                        .map_err(|e| StreamError::Decode(format!("field {name}: {e}")))
                })
                .collect::<Result<_, _>>()?;
            Ok(InboundEntry {
                id: stream_id.id,
                fields,
            })
        })
        .collect()
}

#[async_trait]
impl StreamClient for RedisStreamClient {
    async fn connect(&self) -> Result<(), StreamError> {
        let reader = self
            .client
            .get_connection_manager()
            .await
            .map_err(broker_error)?;
        let writer = self
            .client
            .get_connection_manager()
            .await
            .map_err(broker_error)?;
        *self.connections.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Connections { reader, writer });
        info!("Connected to Redis");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StreamError> {
        // Dropping the managers closes their connections.
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!("Disconnected from Redis");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<InboundEntry>, StreamError> {
        let mut conn = self.connections()?.reader;
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block.as_millis() as usize);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[key], &[">"], &options)
            .await
            .map_err(broker_error)?;

        match reply {
            Some(reply) => decode_reply(reply),
            None => Ok(Vec::new()),
        }
    }

    async fn ack(&self, key: &str, group: &str, id: &str) -> Result<u64, StreamError> {
        let mut conn = self.connections()?.writer;
        let acked: u64 = conn.xack(key, group, &[id]).await.map_err(broker_error)?;
        Ok(acked)
    }

    async fn create_group(&self, key: &str, group: &str, start_id: &str) -> Result<(), StreamError> {
        let mut conn = self.connections()?.writer;
        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(key, group, start_id).await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Err(StreamError::GroupExists {
                group: group.to_string(),
            }),
            Err(e) => Err(broker_error(e)),
        }
    }

    async fn trim(&self, key: &str, max_len: usize) -> Result<u64, StreamError> {
        let mut conn = self.connections()?.writer;
        let evicted: u64 = conn
            .xtrim(key, StreamMaxlen::Approx(max_len))
            .await
            .map_err(broker_error)?;
        debug!(stream = %key, evicted, "XTRIM");
        Ok(evicted)
    }

    async fn append(&self, key: &str, entry: &StreamFields) -> Result<String, StreamError> {
        let mut conn = self.connections()?.writer;
        let id: String = conn
            .xadd(key, "*", entry.fields.as_slice())
            .await
            .map_err(broker_error)?;
        Ok(id)
    }
}
