//! streambot CLI: the main entry point.
//!
//! Commands:
//! - `run`: Start the bridge with the built-in robot
//! - `inject`: Append a chat message to the inbox stream
//! - `config`: Show, validate or locate the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "streambot",
    about = "streambot: a chat bot on Redis Streams",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge and keep reading until Ctrl-C / SIGTERM
    Run {
        /// Use an in-process broker fed from stdin instead of Redis
        #[arg(long)]
        memory: bool,
    },

    /// Append a chat message to the inbox stream
    Inject {
        /// User id of the sender
        #[arg(long, default_value = "user1")]
        sender: String,

        /// Room the message was posted in
        #[arg(long, default_value = "general")]
        room: String,

        /// Message text
        body: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print a default config file
    Default,
    /// Load and validate the configuration
    Validate,
    /// Print the config file location
    Path,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run { memory } => commands::run::run(memory).await?,
        Commands::Inject { sender, room, body } => {
            commands::inject::run(&sender, &room, &body).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Default => commands::config_cmd::default().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_defaults_sender_and_room() {
        let cli = Cli::try_parse_from(["streambot", "inject", "@streambot ping"]).unwrap();
        match cli.command {
            Commands::Inject { sender, room, body } => {
                assert_eq!(sender, "user1");
                assert_eq!(room, "general");
                assert_eq!(body, "@streambot ping");
            }
            _ => panic!("expected inject"),
        }
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["streambot", "run", "--memory", "-v", "--log-json"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Run { memory: true }));
    }

    #[test]
    fn inject_requires_a_body() {
        assert!(Cli::try_parse_from(["streambot", "inject"]).is_err());
    }
}
