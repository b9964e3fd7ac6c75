//! What a listener callback receives.

use std::sync::{Arc, Weak};
use streambot_core::adapter::Adapter;
use streambot_core::error::RuntimeError;
use streambot_core::message::{DomainMessage, Envelope};

/// The matched message plus a way to answer it.
pub struct Response {
    pub envelope: Envelope,
    captures: Vec<Option<String>>,
    adapter: Option<Weak<dyn Adapter>>,
}

impl Response {
    pub(crate) fn new(
        envelope: Envelope,
        captures: Vec<Option<String>>,
        adapter: Option<Weak<dyn Adapter>>,
    ) -> Self {
        Self {
            envelope,
            captures,
            adapter,
        }
    }

    pub fn message(&self) -> &DomainMessage {
        &self.envelope.message
    }

    /// Capture group `index` of the listener's expression; 0 is the whole match.
    pub fn matched(&self, index: usize) -> Option<&str> {
        self.captures.get(index)?.as_deref()
    }

    /// Answer the sender of the matched message.
    pub async fn reply<I, S>(&self, strings: I) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let strings: Vec<String> = strings.into_iter().map(Into::into).collect();
        self.adapter()?
            .reply(&self.envelope, &strings)
            .await
            .map_err(|e| RuntimeError::Handler(e.to_string()))
    }

    /// Post to the room of the matched message.
    pub async fn send<I, S>(&self, strings: I) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let strings: Vec<String> = strings.into_iter().map(Into::into).collect();
        self.adapter()?
            .send(&self.envelope, &strings)
            .await
            .map_err(|e| RuntimeError::Handler(e.to_string()))
    }

    fn adapter(&self) -> Result<Arc<dyn Adapter>, RuntimeError> {
        self.adapter
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(RuntimeError::NoAdapter)
    }
}
