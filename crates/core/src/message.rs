//! Domain message types.
//!
//! These are the values that cross the bridge:
//! Stream entry arrives → translated into a [`DomainMessage`] → bot runtime handles it →
//! the runtime answers with an [`Envelope`] that is published to the outbox.

use serde::{Deserialize, Serialize};

/// A chat participant as seen by the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Platform-specific user id
    #[serde(default)]
    pub id: String,

    /// Human-readable name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The room the user was last seen in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            room: None,
        }
    }

    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }
}

/// The fixed set of message kinds the bot runtime understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Enter,
    Leave,
    Topic,
    CatchAll,
}

impl MessageKind {
    /// The tag carried in the stream entry's `kind` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "TextMessage",
            MessageKind::Enter => "EnterMessage",
            MessageKind::Leave => "LeaveMessage",
            MessageKind::Topic => "TopicMessage",
            MessageKind::CatchAll => "CatchAllMessage",
        }
    }

    /// Resolve a kind tag. Unknown tags resolve to [`MessageKind::Text`] so that
    /// no inbound message is ever dropped for carrying an unfamiliar tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "EnterMessage" => MessageKind::Enter,
            "LeaveMessage" => MessageKind::Leave,
            "TopicMessage" => MessageKind::Topic,
            "CatchAllMessage" => MessageKind::CatchAll,
            _ => MessageKind::Text,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message handed to the bot runtime.
///
/// Serialized with an internal `kind` tag so that the nested `envelope`
/// published to the outbox keeps `message.user`, `message.text` and
/// `message.id` at the top level of the message object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DomainMessage {
    #[serde(rename = "TextMessage")]
    Text {
        user: User,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        adapter: Option<String>,
    },

    #[serde(rename = "EnterMessage")]
    Enter {
        user: User,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        adapter: Option<String>,
    },

    #[serde(rename = "LeaveMessage")]
    Leave {
        user: User,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        adapter: Option<String>,
    },

    #[serde(rename = "TopicMessage")]
    Topic {
        user: User,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        adapter: Option<String>,
    },

    /// Wraps a message no listener handled; `message` is the original payload.
    #[serde(rename = "CatchAllMessage")]
    CatchAll {
        user: User,
        message: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        adapter: Option<String>,
    },
}

impl DomainMessage {
    /// Create a plain text message.
    pub fn text(user: User, text: impl Into<String>, id: Option<String>) -> Self {
        DomainMessage::Text {
            user,
            text: text.into(),
            id,
            adapter: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            DomainMessage::Text { .. } => MessageKind::Text,
            DomainMessage::Enter { .. } => MessageKind::Enter,
            DomainMessage::Leave { .. } => MessageKind::Leave,
            DomainMessage::Topic { .. } => MessageKind::Topic,
            DomainMessage::CatchAll { .. } => MessageKind::CatchAll,
        }
    }

    pub fn user(&self) -> &User {
        match self {
            DomainMessage::Text { user, .. }
            | DomainMessage::Enter { user, .. }
            | DomainMessage::Leave { user, .. }
            | DomainMessage::Topic { user, .. }
            | DomainMessage::CatchAll { user, .. } => user,
        }
    }

    /// The message body, for kinds that carry one.
    pub fn text_body(&self) -> Option<&str> {
        match self {
            DomainMessage::Text { text, .. } | DomainMessage::Topic { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            DomainMessage::Text { id, .. } | DomainMessage::Topic { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// The transport adapter the message originated from.
    pub fn adapter(&self) -> Option<&str> {
        match self {
            DomainMessage::Text { adapter, .. }
            | DomainMessage::Enter { adapter, .. }
            | DomainMessage::Leave { adapter, .. }
            | DomainMessage::Topic { adapter, .. }
            | DomainMessage::CatchAll { adapter, .. } => adapter.as_deref(),
        }
    }

    pub fn set_adapter(&mut self, value: Option<String>) {
        match self {
            DomainMessage::Text { adapter, .. }
            | DomainMessage::Enter { adapter, .. }
            | DomainMessage::Leave { adapter, .. }
            | DomainMessage::Topic { adapter, .. }
            | DomainMessage::CatchAll { adapter, .. } => *adapter = value,
        }
    }
}

/// Delivery wrapper around a message: who it came from and where to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    pub user: User,

    pub message: DomainMessage,
}

impl Envelope {
    /// Build the envelope for answering `message` in the room it came from.
    pub fn for_message(message: DomainMessage) -> Self {
        let user = message.user().clone();
        Self {
            room: user.room.clone(),
            user,
            message,
        }
    }
}
