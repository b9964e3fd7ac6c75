//! `streambot config`: Configuration management commands.

use streambot_config::AppConfig;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn default() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");
            println!();
            println!("   Redis:     {:?}", config.redis);
            println!(
                "   Streams:   {} -> {}",
                config.streams.inbox, config.streams.outbox
            );
            println!(
                "   Group:     {} (consumer {})",
                config.streams.group, config.streams.consumer
            );
            println!("   Ack:       {:?}", config.streams.ack_policy);
            println!("   Outbound:  {:?}", config.streams.outbound_format);
            println!("   Robot:     {}", config.robot.name);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
