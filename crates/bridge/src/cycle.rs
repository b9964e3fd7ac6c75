//! One unit of inbound work: read at most one entry, acknowledge it, dispatch it.

use std::sync::Arc;
use streambot_core::adapter::BotRuntime;
use streambot_core::config::{AckPolicy, BridgeConfig, BridgeOptions};
use streambot_core::error::{BridgeError, StreamError};
use streambot_core::event::{BridgeSignal, BridgeWarning, SignalBus};
use streambot_core::stream::{InboundEntry, StreamClient};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::translator::translate;

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not active; nothing was attempted.
    Idle,
    /// The read timed out without an entry.
    Empty,
    /// One entry was acknowledged and handed to the runtime.
    Delivered { entry_id: String },
}

/// The read/ack/dispatch cycle, bound to one client and one runtime.
pub struct ReadCycle {
    client: Arc<dyn StreamClient>,
    runtime: Arc<dyn BotRuntime>,
    signals: Arc<SignalBus>,
    config: BridgeConfig,
    options: BridgeOptions,
    active: watch::Receiver<bool>,
}

impl ReadCycle {
    pub fn new(
        client: Arc<dyn StreamClient>,
        runtime: Arc<dyn BotRuntime>,
        signals: Arc<SignalBus>,
        config: BridgeConfig,
        options: BridgeOptions,
        active: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            runtime,
            signals,
            config,
            options,
            active,
        }
    }

    /// Whether the owning bridge still wants reads.
    pub fn is_active(&self) -> bool {
        is_active(&self.active)
    }

    /// Perform one cycle.
    ///
    /// Issues one group read for at most one never-delivered entry, blocking up
    /// to the configured interval. A fetched entry is acknowledged (before or
    /// after dispatch, per [`AckPolicy`]) and dispatched; the runtime's
    /// `receive` is awaited before this returns.
    pub async fn read_once(&self) -> Result<CycleOutcome, BridgeError> {
        if !self.is_active() {
            return Ok(CycleOutcome::Idle);
        }
        // Active but disconnected is a failed cycle so the loop backs off.
        if !self.client.is_open() {
            return Err(StreamError::NotConnected.into());
        }

        let entries = self
            .client
            .read_group(
                &self.config.stream_name,
                &self.config.group_name,
                &self.config.consumer_name,
                1,
                self.options.block,
            )
            .await?;

        let Some(entry) = entries.into_iter().next() else {
            return Ok(CycleOutcome::Empty);
        };
        debug!(entry_id = %entry.id, kind = %entry.kind(), "Fetched inbound entry");

        match self.options.ack_policy {
            AckPolicy::BeforeDispatch => {
                self.acknowledge(&entry.id).await?;
                self.dispatch(&entry).await?;
            }
            AckPolicy::AfterDispatch => {
                self.dispatch(&entry).await?;
                self.acknowledge(&entry.id).await?;
            }
        }

        Ok(CycleOutcome::Delivered { entry_id: entry.id })
    }

    /// Ack one entry. A count other than one is a warning, never an error.
    async fn acknowledge(&self, entry_id: &str) -> Result<(), BridgeError> {
        let acked = self
            .client
            .ack(&self.config.stream_name, &self.config.group_name, entry_id)
            .await?;
        if acked != 1 {
            warn!(entry_id = %entry_id, acked, "Unexpected acknowledgment count");
            self.signals
                .publish(BridgeSignal::Warning(BridgeWarning::AckMismatch {
                    entry_id: entry_id.to_string(),
                    acked,
                }));
        }
        Ok(())
    }

    async fn dispatch(&self, entry: &InboundEntry) -> Result<(), BridgeError> {
        let message = translate(entry)?;
        debug!(entry_id = %entry.id, kind = %message.kind(), "Dispatching to runtime");
        self.runtime.receive(message).await?;
        Ok(())
    }
}

/// True while the sender is alive and holds `true`.
pub(crate) fn is_active(active: &watch::Receiver<bool>) -> bool {
    active.has_changed().is_ok() && *active.borrow()
}
