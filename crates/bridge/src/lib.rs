//! Stream bridge between a chat bot runtime and a consumer-group stream.
//!
//! Inbound: stream entry → read/ack cycle → translator → `BotRuntime::receive`.
//! Outbound: runtime → `Adapter::send`/`reply` → outbox stream.
//!
//! Modules:
//! - **bootstrap**: idempotent consumer-group creation and inbox trim
//! - **cycle**: one bounded read, its acknowledgment and dispatch
//! - **translator**: stream entry → [`DomainMessage`](streambot_core::DomainMessage)
//! - **reader**: the continuous loop with error backoff
//! - **outbox**: outbound entry construction and publication
//! - **bridge**: the lifecycle controller ([`StreamBridge`])
//! - **redis_client** / **memory**: [`StreamClient`](streambot_core::StreamClient) implementations

pub mod bootstrap;
pub mod bridge;
pub mod cycle;
pub mod memory;
pub mod outbox;
pub mod reader;
pub mod redis_client;
pub mod translator;

pub use bridge::{LifecyclePhase, StreamBridge};
pub use cycle::{CycleOutcome, ReadCycle};
pub use memory::MemoryStreamClient;
pub use outbox::PublishMethod;
pub use redis_client::RedisStreamClient;
pub use translator::translate;
