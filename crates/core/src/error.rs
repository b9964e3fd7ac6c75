//! Error types for the streambot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all streambot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Bridge errors ---
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    // --- Broker errors ---
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Runtime errors ---
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors raised by a [`crate::StreamClient`] implementation.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The consumer group already exists. Expected on every restart.
    #[error("Consumer group already exists: {group}")]
    GroupExists { group: String },

    #[error("Stream client is not connected")]
    NotConnected,

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Failed to decode broker reply: {0}")]
    Decode(String),
}

/// Errors raised by the bot runtime while handling a message.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("Listener failed: {0}")]
    Handler(String),

    #[error("No adapter attached to the runtime")]
    NoAdapter,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// `send`/`reply`/`run` was called without a stream client.
    #[error("Stream client is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Dispatch failed: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Invalid inbound payload: {0}")]
    Payload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_initialized_displays_correctly() {
        let err = Error::Bridge(BridgeError::NotInitialized);
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn stream_error_converts_into_bridge_error() {
        let err: BridgeError = StreamError::GroupExists {
            group: "hubot-group".into(),
        }
        .into();
        assert!(matches!(err, BridgeError::Stream(StreamError::GroupExists { .. })));
        assert!(err.to_string().contains("hubot-group"));
    }
}
