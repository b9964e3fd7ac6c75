//! # streambot Core
//!
//! Domain types, traits, and error definitions for the streambot stream bridge.
//! This crate has **no broker or runtime dependencies**: it defines the domain
//! model that the bridge, the robot runtime and the binary implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here:
//! - [`StreamClient`]: the broker (group-read, ack, group-create, trim, append)
//! - [`BotRuntime`]: the bot's `receive` entry point
//! - [`Adapter`]: what the runtime uses to talk back (`send`, `reply`)
//!
//! Implementations live in their respective crates, so every seam can be
//! swapped for an in-process stub in tests.

pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use adapter::{Adapter, BotRuntime};
pub use config::{AckPolicy, BridgeConfig, BridgeOptions, OutboundFormat};
pub use error::{BridgeError, Error, Result, RuntimeError, StreamError};
pub use event::{BridgeInfo, BridgeSignal, BridgeWarning, SignalBus};
pub use message::{DomainMessage, Envelope, MessageKind, User};
pub use stream::{InboundEntry, StreamClient, StreamFields};
