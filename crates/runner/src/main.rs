//! Command Runner
//!
//! Serves interactive terminals over WebSocket and one-shot commands over
//! HTTP.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use runner::config::{default_config_path, Config};
use runner::{logging, server};

/// Command Runner - remote interactive shell server.
#[derive(Parser, Debug)]
#[command(name = "command-runner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Port to listen on (overrides config and environment)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    pub write_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    logging::init(&config.logging.level)?;

    if cli.write_config {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        config.save(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    config.validate()?;

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        port = addr.port(),
        shell = %config.terminal.shell,
        max_sessions = config.server.max_sessions,
        "Command runner starting"
    );

    let state = server::AppState::new(config);
    let registry = state.registry.clone();

    server::serve(listener, state, async move {
        server::shutdown_signal().await;
        registry.shutdown_all();
    })
    .await?;

    tracing::info!("Command runner stopped");
    Ok(())
}
