//! Configuration loading, validation, and management for streambot.
//!
//! Loads configuration from `~/.streambot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use streambot_core::config::{AckPolicy, BridgeConfig, BridgeOptions, OutboundFormat};

/// The root configuration structure.
///
/// Maps directly to `~/.streambot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Broker connection
    #[serde(default)]
    pub redis: RedisConfig,

    /// Stream, group and loop settings
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Bot identity
    #[serde(default)]
    pub robot: RobotConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6378".into()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &redact_url(&self.url))
            .finish()
    }
}

/// Hide the password of a connection URL, parsed the way the Redis client parses it.
fn redact_url(url: &str) -> String {
    match redis::parse_redis_url(url) {
        Some(mut parsed) => {
            if parsed.password().is_some() && parsed.set_password(Some("redacted")).is_err() {
                return "[unparseable url]".to_string();
            }
            parsed.to_string()
        }
        None => url.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    #[serde(default = "default_inbox")]
    pub inbox: String,

    #[serde(default = "default_outbox")]
    pub outbox: String,

    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// How long a group read blocks, in milliseconds
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// Pause after a failed read cycle, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Approximate inbox length kept after startup
    #[serde(default = "default_trim_max_len")]
    pub trim_max_len: usize,

    #[serde(default)]
    pub ack_policy: AckPolicy,

    #[serde(default)]
    pub outbound_format: OutboundFormat,
}

fn default_inbox() -> String {
    "hubot-inbox".into()
}
fn default_outbox() -> String {
    "hubot-outbox".into()
}
fn default_group() -> String {
    "hubot-group".into()
}
fn default_consumer() -> String {
    "hubot-consumer-1".into()
}
fn default_block_ms() -> u64 {
    1000
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_trim_max_len() -> usize {
    1000
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            inbox: default_inbox(),
            outbox: default_outbox(),
            group: default_group(),
            consumer: default_consumer(),
            block_ms: default_block_ms(),
            backoff_ms: default_backoff_ms(),
            trim_max_len: default_trim_max_len(),
            ack_policy: AckPolicy::default(),
            outbound_format: OutboundFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Name the bot answers to (`@name ...`)
    #[serde(default = "default_robot_name")]
    pub name: String,

    /// Optional second name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

fn default_robot_name() -> String {
    "streambot".into()
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            name: default_robot_name(),
            alias: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.streambot/config.toml).
    ///
    /// Environment variables override the file:
    /// - `STREAMBOT_REDIS_URL`
    /// - `STREAMBOT_CONSUMER_GROUP_NAME`
    /// - `STREAMBOT_CONSUMER_NAME`
    /// - `STREAMBOT_INBOX_STREAM_NAME`
    /// - `STREAMBOT_OUTBOX_STREAM_NAME`
    /// - `STREAMBOT_ROBOT_NAME`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path, |key| std::env::var(key).ok())
    }

    /// Load from `path`, then apply overrides resolved through `lookup`.
    pub fn load_with_env(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("STREAMBOT_REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(group) = lookup("STREAMBOT_CONSUMER_GROUP_NAME") {
            self.streams.group = group;
        }
        if let Some(consumer) = lookup("STREAMBOT_CONSUMER_NAME") {
            self.streams.consumer = consumer;
        }
        if let Some(inbox) = lookup("STREAMBOT_INBOX_STREAM_NAME") {
            self.streams.inbox = inbox;
        }
        if let Some(outbox) = lookup("STREAMBOT_OUTBOX_STREAM_NAME") {
            self.streams.outbox = outbox;
        }
        if let Some(name) = lookup("STREAMBOT_ROBOT_NAME") {
            self.robot.name = name;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".streambot")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("streams.inbox", &self.streams.inbox),
            ("streams.outbox", &self.streams.outbox),
            ("streams.group", &self.streams.group),
            ("streams.consumer", &self.streams.consumer),
            ("robot.name", &self.robot.name),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{field} must not be empty")));
            }
        }

        if self.streams.inbox == self.streams.outbox {
            return Err(ConfigError::ValidationError(
                "streams.inbox and streams.outbox must differ".into(),
            ));
        }

        if self.streams.block_ms == 0 {
            return Err(ConfigError::ValidationError(
                "streams.block_ms must be > 0".into(),
            ));
        }

        if self.streams.trim_max_len == 0 {
            return Err(ConfigError::ValidationError(
                "streams.trim_max_len must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// The stream identity of the bridge.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            stream_name: self.streams.inbox.clone(),
            outbox_stream_name: self.streams.outbox.clone(),
            group_name: self.streams.group.clone(),
            consumer_name: self.streams.consumer.clone(),
        }
    }

    /// Loop timings and policies.
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            block: Duration::from_millis(self.streams.block_ms),
            backoff: Duration::from_millis(self.streams.backoff_ms),
            trim_max_len: self.streams.trim_max_len,
            ack_policy: self.streams.ack_policy,
            outbound_format: self.streams.outbound_format,
        }
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
