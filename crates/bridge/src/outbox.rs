//! Outbound entry construction and publication.

use chrono::{DateTime, SecondsFormat, Utc};
use streambot_core::config::{BridgeConfig, OutboundFormat};
use streambot_core::error::BridgeError;
use streambot_core::message::Envelope;
use streambot_core::stream::{StreamClient, StreamFields};
use tracing::debug;

/// Which adapter operation produced an outbound entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMethod {
    Send,
    Reply,
}

impl PublishMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishMethod::Send => "send",
            PublishMethod::Reply => "reply",
        }
    }
}

/// Build the outbox entry for `envelope`.
///
/// Field order: `kind`, `method`, `recordedAt`, `occurredAt`, `id`, then either
/// `envelope` or `sender`/`room`/`body`, then `strings`, `consumerName`, `adapter`.
pub fn build_outbound(
    method: PublishMethod,
    envelope: &Envelope,
    strings: &[String],
    config: &BridgeConfig,
    format: OutboundFormat,
    now: DateTime<Utc>,
) -> Result<StreamFields, BridgeError> {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut out = StreamFields::default();
    out.push("kind", envelope.message.kind().as_str());
    out.push("method", method.as_str());
    out.push("recordedAt", timestamp.clone());
    out.push("occurredAt", timestamp);
    out.push("id", now.timestamp_millis().to_string());

    match format {
        OutboundFormat::Nested => {
            out.push("envelope", serde_json::to_string(envelope)?);
        }
        OutboundFormat::Flat => {
            let room = envelope
                .room
                .as_deref()
                .or(envelope.user.room.as_deref())
                .unwrap_or_default();
            out.push("sender", envelope.user.id.as_str());
            out.push("room", room);
            out.push("body", envelope.message.text_body().unwrap_or_default());
        }
    }

    out.push("strings", strings.join(" "));
    out.push("consumerName", config.consumer_name.as_str());
    out.push("adapter", envelope.message.adapter().unwrap_or_default());
    Ok(out)
}

/// Append a built entry to the outbox stream; returns the broker-assigned id.
pub async fn publish(
    client: &dyn StreamClient,
    config: &BridgeConfig,
    entry: &StreamFields,
) -> Result<String, BridgeError> {
    let id = client.append(&config.outbox_stream_name, entry).await?;
    debug!(
        stream = %config.outbox_stream_name,
        entry_id = %id,
        method = entry.get("method").unwrap_or_default(),
        "Published outbound entry"
    );
    Ok(id)
}
