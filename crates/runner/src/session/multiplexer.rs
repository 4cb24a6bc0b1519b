//! Terminal multiplexer integration.
//!
//! The shell-side multiplexer is driven two ways: by typing command lines
//! into the PTY (see the dispatcher) and by out-of-band invocations of the
//! multiplexer binary, which live here behind the [`Multiplexer`] trait.

use std::future::Future;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;

/// Errors from out-of-band multiplexer invocations.
#[derive(Error, Debug)]
pub enum MultiplexerError {
    /// The command line contained no tokens.
    #[error("empty command")]
    EmptyCommand,

    /// The binary could not be started.
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The binary ran and reported failure.
    #[error("{0}")]
    Failed(ExitStatus),
}

/// Out-of-band access to the multiplexer.
pub trait Multiplexer: Send + Sync {
    /// Returns whether a session with the given name exists. A binary that
    /// cannot be started counts as "no such session".
    fn has_session(&self, name: &str) -> impl Future<Output = bool> + Send;

    /// Runs one administrative command with no stdio attached.
    fn run_command(
        &self,
        args: Vec<String>,
    ) -> impl Future<Output = Result<(), MultiplexerError>> + Send;
}

/// Splits an administrative command line on whitespace.
pub fn tokenize(command_line: &str) -> Vec<String> {
    command_line.split_whitespace().map(str::to_string).collect()
}

/// [`Multiplexer`] backed by the tmux binary.
#[derive(Debug, Clone)]
pub struct TmuxMultiplexer {
    binary: String,
}

impl TmuxMultiplexer {
    /// Creates a multiplexer that invokes the given binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl Multiplexer for TmuxMultiplexer {
    async fn has_session(&self, name: &str) -> bool {
        let args = ["has-session".to_string(), "-t".to_string(), name.to_string()];
        match self.command(&args).status().await {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::debug!(binary = %self.binary, error = %e, "Session probe failed to start");
                false
            }
        }
    }

    async fn run_command(&self, args: Vec<String>) -> Result<(), MultiplexerError> {
        if args.is_empty() {
            return Err(MultiplexerError::EmptyCommand);
        }

        let status = self
            .command(&args)
            .status()
            .await
            .map_err(|source| MultiplexerError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(MultiplexerError::Failed(status))
        }
    }
}
