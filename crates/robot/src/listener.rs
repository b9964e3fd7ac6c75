//! Listener registration types.

use futures::FutureExt;
use futures::future::BoxFuture;
use regex_lite::Regex;
use std::future::Future;
use std::sync::Arc;
use streambot_core::error::RuntimeError;
use streambot_core::message::{DomainMessage, MessageKind};

use crate::response::Response;

/// A boxed async listener callback.
pub type Handler =
    Arc<dyn Fn(Response) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
{
    Arc::new(move |res| f(res).boxed())
}

#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("Invalid listener pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
}

/// What a listener fires on.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Text messages whose body matches the expression.
    Text(Regex),
    /// Every message of the given kind.
    Kind(MessageKind),
}

impl Matcher {
    /// Build the expression for a listener that only fires when the robot is
    /// addressed by name or alias, e.g. `@bot ping`, `bot: ping`, `Bot, ping`.
    pub fn addressed(name: &str, alias: Option<&str>, pattern: &str) -> Result<Self, RobotError> {
        let names = match alias {
            Some(alias) => format!("{}|{}", regex_lite::escape(name), regex_lite::escape(alias)),
            None => regex_lite::escape(name),
        };
        let expr = format!(r"(?i)^\s*@?(?:{names})[:,]?\s*(?:{pattern})");
        Self::expression(&expr).map_err(|e| match e {
            RobotError::InvalidPattern { source, .. } => RobotError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            },
        })
    }

    /// A listener that fires on any text message matching `pattern`.
    pub fn expression(pattern: &str) -> Result<Self, RobotError> {
        Regex::new(pattern)
            .map(Matcher::Text)
            .map_err(|source| RobotError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Test `message`. A match yields the capture groups (group 0 first).
    pub fn captures(&self, message: &DomainMessage) -> Option<Vec<Option<String>>> {
        match self {
            Matcher::Text(re) => {
                let DomainMessage::Text { text, .. } = message else {
                    return None;
                };
                re.captures(text).map(|caps| {
                    caps.iter()
                        .map(|group| group.map(|m| m.as_str().to_string()))
                        .collect()
                })
            }
            Matcher::Kind(kind) => (message.kind() == *kind).then(Vec::new),
        }
    }
}

/// A registered matcher plus its callback.
pub struct Listener {
    pub matcher: Matcher,
    pub handler: Handler,
}
