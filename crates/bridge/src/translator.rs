//! Stream entry → domain message.
//!
//! Two inbound shapes are accepted:
//! - **nested**: an `envelope` field holding a serialized envelope
//!   (`message.user`, `message.text`, `message.id`); the entry's `kind` selects the variant
//! - **flat**: `sender`, `room`, `body`, `id` fields; always a text message

use serde_json::Value;
use streambot_core::error::BridgeError;
use streambot_core::message::{DomainMessage, MessageKind, User};
use streambot_core::stream::InboundEntry;

/// Build the domain message an inbound entry carries.
///
/// Every kind tag maps to a variant; unknown tags produce a text message. The
/// only failure is a nested `envelope` field that is not valid JSON.
pub fn translate(entry: &InboundEntry) -> Result<DomainMessage, BridgeError> {
    let mut message = match entry.field("envelope") {
        Some(raw) => from_envelope(entry.kind(), raw)?,
        None => from_flat_fields(entry),
    };
    message.set_adapter(entry.field("adapter").map(str::to_string));
    Ok(message)
}

fn from_envelope(kind: &str, raw: &str) -> Result<DomainMessage, BridgeError> {
    let envelope: Value = serde_json::from_str(raw)
        .map_err(|e| BridgeError::Payload(format!("envelope is not valid JSON: {e}")))?;
    let message = envelope.get("message").cloned().unwrap_or(Value::Null);

    let mut user: User = message
        .get("user")
        .cloned()
        .and_then(|u| serde_json::from_value(u).ok())
        .unwrap_or_default();
    if user.room.is_none() {
        user.room = string_field(&envelope, "room");
    }

    let text = string_field(&message, "text").unwrap_or_default();
    let id = string_field(&message, "id");

    Ok(match MessageKind::from_tag(kind) {
        MessageKind::Enter => DomainMessage::Enter {
            user,
            adapter: None,
        },
        MessageKind::Leave => DomainMessage::Leave {
            user,
            adapter: None,
        },
        MessageKind::CatchAll => DomainMessage::CatchAll {
            user,
            message,
            adapter: None,
        },
        MessageKind::Topic => DomainMessage::Topic {
            user,
            text,
            id,
            adapter: None,
        },
        MessageKind::Text => DomainMessage::text(user, text, id),
    })
}

fn from_flat_fields(entry: &InboundEntry) -> DomainMessage {
    let mut user = User::new(entry.field("sender").unwrap_or_default());
    user.room = entry.field("room").map(str::to_string);
    DomainMessage::text(
        user,
        entry.field("body").unwrap_or_default(),
        entry.field("id").map(str::to_string),
    )
}

/// Read a string-or-number field as a string.
fn string_field(value: &Value, name: &str) -> Option<String> {
    match value.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
