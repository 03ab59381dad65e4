mod server;

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::info;

use relaytv_core::{logging, Config};

use server::RelayServer;

/// Adaptive stream delivery gateway
#[derive(Debug, Parser)]
#[command(name = "relaytv", version, about)]
struct Args {
    /// Path to a YAML/TOML/JSON config file
    #[arg(short, long, env = "RELAYTV_CONFIG_PATH")]
    config: Option<String>,
}

/// Resolve the config file: flag or env var > CWD > environment only.
/// An explicitly named file must exist.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(path) = &args.config {
        if !Path::new(path).exists() {
            anyhow::bail!("Config file not found: {path}");
        }
    }
    let config_path = args.config.clone().or_else(|| {
        let cwd = "config.yaml";
        Path::new(cwd).exists().then(|| cwd.to_string())
    });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path)?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = load_config(&args)?;

    // 2. Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("RelayTV server starting...");
    info!("HTTP address: {}", config.http_address());
    info!(
        gateway = %config.gateway.public_path,
        relays = config.playback.relays.len(),
        max_redirects = config.gateway.max_redirects,
        "Gateway configured"
    );

    // 4. Serve until a shutdown signal arrives
    RelayServer::new(config).run().await?;

    info!("RelayTV server stopped");
    Ok(())
}
