//! Tracing subscriber setup.
//!
//! The level is chosen once at startup. `RUST_LOG` takes precedence when it
//! is set; otherwise the configured level applies to every target.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Builds the filter for the given level, preferring `RUST_LOG` when set.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level)),
    }
}

/// Installs the global fmt subscriber.
pub fn init(level: &str) -> Result<()> {
    let filter = build_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
