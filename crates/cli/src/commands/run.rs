//! `streambot run`: Start the bridge with the built-in robot.

use std::sync::Arc;
use streambot_bridge::{MemoryStreamClient, RedisStreamClient, StreamBridge};
use streambot_config::{AppConfig, RobotConfig};
use streambot_core::adapter::Adapter;
use streambot_core::event::BridgeSignal;
use streambot_core::stream::StreamClient;
use streambot_robot::{Robot, RobotError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::inject::inbox_entry;

/// The robot the binary runs: `ping` → `PONG`, `echo <text>` → `<text>`.
pub fn build_robot(config: &RobotConfig) -> Result<Robot, RobotError> {
    let mut robot = Robot::new(config.name.as_str());
    if let Some(alias) = config.alias.as_deref().filter(|a| !a.trim().is_empty()) {
        robot = robot.with_alias(alias);
    }

    robot.respond(r"ping\s*$", |res| async move { res.reply(["PONG"]).await })?;
    robot.respond(r"echo\s+(.+)$", |res| async move {
        let said = res.matched(1).unwrap_or_default().to_string();
        res.send([said]).await
    })?;
    Ok(robot)
}

/// Wire `robot` and `client` into a bridge. The bridge is also the robot's adapter.
pub fn wire(robot: Arc<Robot>, client: Arc<dyn StreamClient>, config: &AppConfig) -> Arc<StreamBridge> {
    let bridge = Arc::new(
        StreamBridge::new(robot.clone(), client, config.bridge_config())
            .with_options(config.bridge_options()),
    );
    let adapter: Arc<dyn Adapter> = bridge.clone();
    robot.attach(&adapter);
    bridge
}

pub async fn run(memory: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let robot = Arc::new(build_robot(&config.robot)?);

    let memory_client = memory.then(|| Arc::new(MemoryStreamClient::new()));
    let client: Arc<dyn StreamClient> = match &memory_client {
        Some(client) => client.clone(),
        None => Arc::new(RedisStreamClient::open(&config.redis.url)?),
    };

    let bridge = wire(robot, client, &config);
    tokio::spawn(report_signals(bridge.subscribe(), memory));

    bridge.run().await?;
    println!(
        "streambot listening on {} as {} (group {})",
        config.streams.inbox, config.robot.name, config.streams.group
    );

    match memory_client {
        Some(client) => {
            println!("Type messages, e.g. \"@{} ping\". Ctrl-D or Ctrl-C to stop.", config.robot.name);
            tokio::select! {
                _ = feed_stdin(client, config.streams.inbox.clone()) => {}
                _ = shutdown_signal() => {}
            }
        }
        None => shutdown_signal().await,
    }

    info!("Shutdown requested");
    bridge.close().await?;
    Ok(())
}

/// Append every stdin line to the in-process inbox as if a chat user typed it.
async fn feed_stdin(client: Arc<MemoryStreamClient>, inbox: String) {
    let mut lines = stdin_lines();
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = client.append(&inbox, &inbox_entry("shell", "shell", &line)).await {
            warn!(error = %e, "Failed to append stdin line");
        }
    }
}

/// Blocking stdin reads live on a plain thread so they never hold up runtime shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn report_signals(mut rx: broadcast::Receiver<Arc<BridgeSignal>>, echo: bool) {
    loop {
        let signal = match rx.recv().await {
            Ok(signal) => signal,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Signal receiver lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        match signal.as_ref() {
            BridgeSignal::Connected { adapter } => info!(adapter = %adapter, "Bridge connected"),
            BridgeSignal::Warning(warning) => warn!("{warning}"),
            BridgeSignal::Info(notice) => info!("{notice}"),
            BridgeSignal::Reply { envelope, strings } => {
                let text = strings.join(" ");
                if echo {
                    println!("{}: {text}", envelope.user.id);
                }
                info!(room = envelope.room.as_deref().unwrap_or_default(), text = %text, "Replied");
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
