//! Configuration management for the command runner.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/command-runner/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default banner shown before the first keystroke.
pub const DEFAULT_WELCOME_BANNER: &str = "Welcome to the interactive terminal!\n\n\
This terminal supports multiple tabs and split panes using tmux.\n\
Press Enter to start tmux, or type commands directly in bash.\n\n";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be greater than 0")]
    InvalidPort,

    #[error("max_sessions must be between 1 and 1000, got {0}")]
    InvalidMaxSessions(usize),

    #[error("exec timeout_secs must be greater than 0")]
    InvalidExecTimeout,

    #[error("request_timeout_secs ({request}) must exceed exec timeout_secs ({exec})")]
    RequestTimeoutTooShort { request: u64, exec: u64 },

    #[error("terminal size must be non-zero, got {cols}x{rows}")]
    InvalidTerminalSize { cols: u16, rows: u16 },

    #[error("shell not found: {0}")]
    InvalidShellPath(String),

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the command runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Interactive terminal settings.
    pub terminal: TerminalConfig,

    /// Terminal multiplexer settings.
    pub multiplexer: MultiplexerConfig,

    /// One-shot command execution settings.
    pub exec: ExecConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,

    /// Port to listen on.
    pub port: u16,

    /// Timeout for non-WebSocket requests. Must exceed the exec timeout so
    /// the output of a timed-out command can still be written.
    pub request_timeout_secs: u64,

    /// Maximum number of concurrent terminal sessions.
    pub max_sessions: usize,
}

/// Interactive terminal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell spawned for each terminal session.
    pub shell: String,

    /// Value of `TERM` in the shell environment.
    pub term: String,

    /// Value of `PS1` in the shell environment.
    pub prompt: String,

    /// Initial terminal width.
    pub cols: u16,

    /// Initial terminal height.
    pub rows: u16,

    /// Text sent as the first output frame of every session.
    pub welcome_banner: String,
}

/// Terminal multiplexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Multiplexer executable.
    pub binary: String,

    /// Name of the session to attach to or create.
    pub session_name: String,

    /// Control prefix byte (0x02 is Ctrl-B).
    pub prefix_key: u8,
}

/// One-shot command execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecConfig {
    /// Interpreter invoked as `<shell> -c <cmd>`.
    pub shell: String,

    /// Hard timeout after which the command is killed.
    pub timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            request_timeout_secs: 40,
            max_sessions: 64,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            term: "xterm-256color".to_string(),
            prompt: "\\u@\\h:\\w\\$ ".to_string(),
            cols: 80,
            rows: 24,
            welcome_banner: DEFAULT_WELCOME_BANNER.to_string(),
        }
    }
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            session_name: "default".to_string(),
            prefix_key: 0x02,
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Returns the socket address to listen on.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address: {}:{}", self.bind_address, self.port))
    }

    /// Returns the request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ExecConfig {
    /// Returns the command timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LoggingConfig {
    /// Returns true when verbose diagnostics are enabled.
    pub fn is_debug(&self) -> bool {
        matches!(self.level.to_lowercase().as_str(), "debug" | "trace")
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("command-runner")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - DEBUG: `1` enables verbose diagnostic logging
    /// - COMMAND_RUNNER_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - COMMAND_RUNNER_PORT: Override the listening port
    pub fn apply_env_overrides(&mut self) {
        if std::env::var("DEBUG").is_ok_and(|v| v == "1") {
            self.logging.level = "debug".to_string();
        }

        if let Ok(level) = std::env::var("COMMAND_RUNNER_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }

        if let Ok(port) = std::env::var("COMMAND_RUNNER_PORT") {
            if !port.is_empty() {
                match port.parse::<u16>() {
                    Ok(port) => {
                        tracing::info!("Overriding port from environment: {}", port);
                        self.server.port = port;
                    }
                    Err(e) => {
                        tracing::warn!(value = %port, error = %e, "Ignoring invalid COMMAND_RUNNER_PORT");
                    }
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.server.max_sessions < 1 || self.server.max_sessions > 1000 {
            return Err(ConfigError::InvalidMaxSessions(self.server.max_sessions));
        }

        if self.exec.timeout_secs == 0 {
            return Err(ConfigError::InvalidExecTimeout);
        }

        if self.server.request_timeout_secs <= self.exec.timeout_secs {
            return Err(ConfigError::RequestTimeoutTooShort {
                request: self.server.request_timeout_secs,
                exec: self.exec.timeout_secs,
            });
        }

        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            return Err(ConfigError::InvalidTerminalSize {
                cols: self.terminal.cols,
                rows: self.terminal.rows,
            });
        }

        validate_shell(&self.terminal.shell)?;
        validate_shell(&self.exec.shell)?;

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Checks that a shell exists, either as an absolute path or on `PATH`.
fn validate_shell(shell: &str) -> Result<(), ConfigError> {
    let path = Path::new(shell);
    let found = if path.is_absolute() {
        path.exists()
    } else {
        which::which(shell).is_ok()
    };

    if found {
        Ok(())
    } else {
        Err(ConfigError::InvalidShellPath(shell.to_string()))
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
