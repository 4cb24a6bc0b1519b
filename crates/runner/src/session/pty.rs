//! Pseudo-terminal process launcher.
//!
//! Allocates a PTY pair, spawns the configured shell on the slave side and
//! hands back the three pieces a session needs: the input side of the
//! master (for the dispatcher), a reader (for the output pump) and a shared
//! handle on the shell process (for teardown).

use std::future::Future;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use protocol::WindowSize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::resize::apply_window_size;
use crate::config::TerminalConfig;

/// Errors that prevent a terminal session from starting.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The PTY pair could not be allocated.
    #[error("failed to open PTY: {0}")]
    OpenPty(String),

    /// The shell could not be spawned on the slave side.
    #[error("failed to spawn {shell}: {reason}")]
    Spawn { shell: String, reason: String },

    /// A reader or writer could not be obtained from the master side.
    #[error("failed to obtain PTY handle: {0}")]
    Handle(String),
}

/// Errors that can occur while a session is running.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the shell process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process exited with a code.
    Exited(u32),
    /// The process status could not be collected.
    Unknown,
}

/// Number of pending writes queued ahead of the input writer thread.
pub const INPUT_QUEUE_CAPACITY: usize = 64;

/// Input side of a terminal: the only path into the shell.
///
/// Implemented by [`PtyTerminal`]; the dispatcher is generic over it so it
/// can be driven without a real PTY.
pub trait TerminalIo: Send {
    /// Queues bytes for the process input, preserving order.
    ///
    /// Waits only while the input queue is full.
    fn write_input(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Applies a new window size to the terminal.
    fn resize(&mut self, size: WindowSize) -> Result<(), SessionError>;
}

/// The master side of a PTY, owned by the dispatcher.
///
/// Writes go through a dedicated thread, so a program that stops reading
/// its input blocks that thread and never a runtime worker.
pub struct PtyTerminal {
    master: Box<dyn MasterPty + Send>,
    input: mpsc::Sender<Vec<u8>>,
}

impl TerminalIo for PtyTerminal {
    async fn write_input(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.input
            .send(data.to_vec())
            .await
            .map_err(|_| SessionError::WriteFailed("input writer stopped".to_string()))
    }

    fn resize(&mut self, size: WindowSize) -> Result<(), SessionError> {
        apply_window_size(self.master.as_ref(), size)
    }
}

/// Starts the thread that owns the master's writer.
///
/// The thread exits when every sender is dropped or a write fails; the
/// next [`TerminalIo::write_input`] then reports the failure.
fn spawn_input_writer(
    mut writer: Box<dyn Write + Send>,
) -> std::io::Result<mpsc::Sender<Vec<u8>>> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(INPUT_QUEUE_CAPACITY);
    let span = tracing::Span::current();

    std::thread::Builder::new()
        .name("pty-input".to_string())
        .spawn(move || {
            let _entered = span.enter();
            while let Some(data) = rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|()| writer.flush()) {
                    tracing::debug!(error = %e, "PTY input writer stopped");
                    break;
                }
            }
        })?;

    Ok(tx)
}

/// Shared handle on the shell process.
///
/// Termination is idempotent: only the first call to [`ProcessHandle::terminate`]
/// signals and reaps the process, later calls return immediately.
pub struct ProcessHandle {
    child: Mutex<Box<dyn Child + Send + Sync>>,
    pid: Option<u32>,
    terminated: AtomicBool,
}

impl ProcessHandle {
    fn new(child: Box<dyn Child + Send + Sync>) -> Self {
        let pid = child.process_id();
        Self {
            child: Mutex::new(child),
            pid,
            terminated: AtomicBool::new(false),
        }
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kills the process if it is still running and reaps it.
    ///
    /// Blocks until the process has been collected. Returns `None` when an
    /// earlier call already terminated the process.
    pub fn terminate(&self) -> Option<ProcessStatus> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return None;
        }

        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());

        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(pid = ?self.pid, code = status.exit_code(), "Shell already exited");
            return Some(ProcessStatus::Exited(status.exit_code()));
        }

        if let Err(e) = child.kill() {
            // Raced with a natural exit; wait() below still reaps it.
            tracing::debug!(pid = ?self.pid, error = %e, "Kill failed");
        }

        match child.wait() {
            Ok(status) => {
                tracing::debug!(pid = ?self.pid, code = status.exit_code(), "Shell terminated");
                Some(ProcessStatus::Exited(status.exit_code()))
            }
            Err(e) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Failed to reap shell");
                Some(ProcessStatus::Unknown)
            }
        }
    }
}

/// Everything produced by a successful launch.
pub struct LaunchedTerminal {
    /// Input side, for the dispatcher.
    pub terminal: PtyTerminal,
    /// Output side, for the pump.
    pub reader: Box<dyn Read + Send>,
    /// The shell process.
    pub process: Arc<ProcessHandle>,
}

/// Spawns the configured shell on a fresh PTY.
pub fn launch(config: &TerminalConfig) -> Result<LaunchedTerminal, LaunchError> {
    let pty_system = native_pty_system();

    let pair = pty_system
        .openpty(PtySize {
            rows: config.rows,
            cols: config.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| LaunchError::OpenPty(e.to_string()))?;

    let mut cmd = CommandBuilder::new(&config.shell);
    cmd.env("TERM", &config.term);
    cmd.env("PS1", &config.prompt);

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| LaunchError::Spawn {
            shell: config.shell.clone(),
            reason: e.to_string(),
        })?;

    // The parent must not keep the slave open, or the master never sees EOF
    // after the shell dies.
    drop(pair.slave);

    let process = Arc::new(ProcessHandle::new(child));

    let handles = pair.master.try_clone_reader().and_then(|reader| {
        let writer = pair.master.take_writer()?;
        Ok((reader, writer))
    });
    let (reader, writer) = match handles {
        Ok(handles) => handles,
        Err(e) => {
            process.terminate();
            return Err(LaunchError::Handle(e.to_string()));
        }
    };

    let input = match spawn_input_writer(writer) {
        Ok(input) => input,
        Err(e) => {
            process.terminate();
            return Err(LaunchError::Handle(e.to_string()));
        }
    };

    tracing::debug!(pid = ?process.pid(), shell = %config.shell, "Terminal process started");

    Ok(LaunchedTerminal {
        terminal: PtyTerminal {
            master: pair.master,
            input,
        },
        reader,
        process,
    })
}
