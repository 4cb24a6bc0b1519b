//! One-shot command execution endpoint.

use std::process::Stdio;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::error::AppError;
use super::AppState;

/// Body of `POST /run`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub cmd: String,
    /// Log the command and its output.
    #[serde(default)]
    pub debug: bool,
}

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited; `None` when it died from a signal.
    Exited(Option<i32>),
    /// The process outlived the timeout and was killed.
    TimedOut,
}

/// Output collected from one command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// stdout and stderr interleaved in arrival order.
    pub output: Vec<u8>,
    pub outcome: ExitOutcome,
}

/// Errors from running a command.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The interpreter could not be started.
    #[error("failed to start {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs `cmd` through `shell -c`, killing it after `timeout`.
///
/// Output read before the deadline is returned even when the command is
/// killed.
pub async fn run_command(
    shell: &str,
    cmd: &str,
    timeout: Duration,
) -> Result<CommandOutput, ExecError> {
    let mut child = Command::new(shell)
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            shell: shell.to_string(),
            source,
        })?;

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(32);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward(stderr, tx.clone()));
    }
    drop(tx);

    let mut output = Vec::new();
    let finished = tokio::time::timeout(timeout, async {
        while let Some(chunk) = rx.recv().await {
            output.extend_from_slice(&chunk);
        }
        child.wait().await
    })
    .await;

    let outcome = match finished {
        Ok(status) => ExitOutcome::Exited(status?.code()),
        Err(_) => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to kill timed-out command");
            }
            let _ = child.wait().await;
            while let Ok(chunk) = rx.try_recv() {
                output.extend_from_slice(&chunk);
            }
            ExitOutcome::TimedOut
        }
    };

    Ok(CommandOutput { output, outcome })
}

async fn forward<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// `POST /run`
pub async fn run_handler(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: ExecRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejecting malformed run request");
        AppError::InvalidJson
    })?;

    if request.cmd.trim().is_empty() {
        tracing::warn!("Rejecting empty command");
        return Err(AppError::BadRequest("Command cannot be empty".to_string()));
    }

    let verbose = request.debug || state.config.logging.is_debug();
    if verbose {
        tracing::info!(cmd = %request.cmd, "Executing command");
    }

    let exec = &state.config.exec;
    let result = run_command(&exec.shell, &request.cmd, exec.timeout())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Command execution failed");
            AppError::Internal(e.to_string())
        })?;

    match result.outcome {
        ExitOutcome::TimedOut => {
            tracing::warn!(timeout_secs = exec.timeout_secs, "Command timed out")
        }
        ExitOutcome::Exited(code) if verbose => {
            tracing::info!(
                exit_code = ?code,
                output = %String::from_utf8_lossy(&result.output),
                "Command finished"
            )
        }
        ExitOutcome::Exited(_) => {}
    }

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        result.output,
    )
        .into_response())
}
