//! The runtime itself.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};
use streambot_core::adapter::{Adapter, BotRuntime};
use streambot_core::error::RuntimeError;
use streambot_core::message::{DomainMessage, Envelope, MessageKind};
use tracing::{debug, info, warn};

use crate::listener::{Handler, Listener, Matcher, RobotError, handler};
use crate::response::Response;

/// A named bot with a set of listeners.
pub struct Robot {
    name: String,
    alias: Option<String>,
    listeners: RwLock<Vec<Arc<Listener>>>,
    catch_all: RwLock<Option<Handler>>,
    adapter: OnceLock<Weak<dyn Adapter>>,
}

impl Robot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            listeners: RwLock::new(Vec::new()),
            catch_all: RwLock::new(None),
            adapter: OnceLock::new(),
        }
    }

    /// An extra name the robot answers to in `respond` listeners.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the adapter responses are routed through. Only a weak reference
    /// is kept: the adapter owns the robot, not the other way round.
    pub fn attach(&self, adapter: &Arc<dyn Adapter>) {
        if self.adapter.set(Arc::downgrade(adapter)).is_err() {
            warn!(robot = %self.name, "Adapter already attached, ignoring");
            return;
        }
        info!(robot = %self.name, adapter = %adapter.name(), "Adapter attached");
    }

    /// Fire on text addressed to the robot: `@name pattern`, `name: pattern`, ...
    pub fn respond<F, Fut>(&self, pattern: &str, callback: F) -> Result<(), RobotError>
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        let matcher = Matcher::addressed(&self.name, self.alias.as_deref(), pattern)?;
        self.listen(matcher, handler(callback));
        Ok(())
    }

    /// Fire on any text matching `pattern`, addressed or not.
    pub fn hear<F, Fut>(&self, pattern: &str, callback: F) -> Result<(), RobotError>
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        self.listen(Matcher::expression(pattern)?, handler(callback));
        Ok(())
    }

    pub fn enter<F, Fut>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        self.listen(Matcher::Kind(MessageKind::Enter), handler(callback));
    }

    pub fn leave<F, Fut>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        self.listen(Matcher::Kind(MessageKind::Leave), handler(callback));
    }

    pub fn topic<F, Fut>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        self.listen(Matcher::Kind(MessageKind::Topic), handler(callback));
    }

    /// Fallback for messages no other listener matched. Replaces any previous one.
    pub fn catch_all<F, Fut>(&self, callback: F)
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        *self
            .catch_all
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler(callback));
    }

    /// Register a listener built elsewhere.
    pub fn listen(&self, matcher: Matcher, handler: Handler) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(Listener { matcher, handler }));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn response(&self, envelope: Envelope, captures: Vec<Option<String>>) -> Response {
        Response::new(envelope, captures, self.adapter.get().cloned())
    }

    async fn fall_back(&self, message: DomainMessage) -> Result<(), RuntimeError> {
        let catch_all = self
            .catch_all
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(catch_all) = catch_all else {
            debug!(kind = %message.kind(), "No listener matched");
            return Ok(());
        };

        let wrapped = DomainMessage::CatchAll {
            user: message.user().clone(),
            message: serde_json::to_value(&message)
                .map_err(|e| RuntimeError::Handler(e.to_string()))?,
            adapter: message.adapter().map(str::to_string),
        };
        catch_all(self.response(Envelope::for_message(wrapped), Vec::new())).await
    }
}

#[async_trait]
impl BotRuntime for Robot {
    async fn receive(&self, message: DomainMessage) -> Result<(), RuntimeError> {
        let listeners: Vec<Arc<Listener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut matched = false;
        let mut first_error = None;
        for listener in listeners {
            let Some(captures) = listener.matcher.captures(&message) else {
                continue;
            };
            matched = true;
            let envelope = Envelope::for_message(message.clone());
            if let Err(e) = (listener.handler)(self.response(envelope, captures)).await {
                warn!(error = %e, kind = %message.kind(), "Listener failed");
                first_error.get_or_insert(e);
            }
        }

        if !matched && message.kind() != MessageKind::CatchAll {
            self.fall_back(message).await?;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
