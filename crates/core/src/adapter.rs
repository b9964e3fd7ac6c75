//! The two seams between the bridge and the bot runtime.
//!
//! - [`BotRuntime`] is what the bridge delivers inbound messages to.
//! - [`Adapter`] is what the runtime answers through.
//!
//! The bridge never assumes a concrete runtime: it only needs `receive`.

use async_trait::async_trait;

use crate::error::{BridgeError, RuntimeError};
use crate::message::{DomainMessage, Envelope};

/// The bot runtime's receive entry point.
#[async_trait]
pub trait BotRuntime: Send + Sync {
    /// Handle one inbound message. The bridge awaits this before reading the
    /// next entry, so a slow handler applies back-pressure to the stream.
    async fn receive(&self, message: DomainMessage) -> Result<(), RuntimeError>;
}

/// The transport a runtime is plugged into.
///
/// Implementations own their connection lifecycle and publish the runtime's
/// outbound messages.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable adapter name (e.g., "redis-stream").
    fn name(&self) -> &str;

    /// Connect and start delivering inbound messages. Returns once delivery
    /// has been launched, not once it finishes.
    async fn run(&self) -> Result<(), BridgeError>;

    /// Stop delivery, drain the in-flight message and disconnect.
    async fn close(&self) -> Result<(), BridgeError>;

    /// Publish a new message addressed by `envelope`.
    async fn send(&self, envelope: &Envelope, strings: &[String]) -> Result<(), BridgeError>;

    /// Publish an answer to the message carried in `envelope`.
    async fn reply(&self, envelope: &Envelope, strings: &[String]) -> Result<(), BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::User;
    use std::sync::Mutex;

    struct RecordingRuntime {
        seen: Mutex<Vec<DomainMessage>>,
    }

    #[async_trait]
    impl BotRuntime for RecordingRuntime {
        async fn receive(&self, message: DomainMessage) -> Result<(), RuntimeError> {
            self.seen.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn runtime_is_usable_as_trait_object() {
        let runtime = std::sync::Arc::new(RecordingRuntime {
            seen: Mutex::new(vec![]),
        });
        let dyn_runtime: std::sync::Arc<dyn BotRuntime> = runtime.clone();
        dyn_runtime
            .receive(DomainMessage::text(User::new("u1"), "hi", None))
            .await
            .unwrap();
        assert_eq!(runtime.seen.lock().unwrap().len(), 1);
    }
}
