//! `streambot inject`: Append a chat message to the inbox stream.

use streambot_bridge::RedisStreamClient;
use streambot_config::AppConfig;
use streambot_core::stream::{StreamClient, StreamFields};

/// The flat inbound shape a chat front end appends.
pub fn inbox_entry(sender: &str, room: &str, body: &str) -> StreamFields {
    let mut entry = StreamFields::default();
    entry.push("kind", "InboxEnvelope");
    entry.push("sender", sender);
    entry.push("room", room);
    entry.push("body", body);
    entry
}

pub async fn run(sender: &str, room: &str, body: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let client = RedisStreamClient::open(&config.redis.url)?;
    client.connect().await?;
    let appended = client
        .append(&config.streams.inbox, &inbox_entry(sender, room, body))
        .await;
    client.disconnect().await?;

    let id = appended?;
    println!("Appended {id} to {}", config.streams.inbox);
    Ok(())
}
