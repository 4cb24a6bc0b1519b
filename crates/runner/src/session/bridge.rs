//! Session lifecycle coordinator.
//!
//! Bridges one WebSocket connection to one PTY-backed shell:
//!
//! ```text
//!             ┌──────────────┐  input/resize/tmux   ┌─────────────┐
//!  WebSocket ─┤ inbound loop ├─────────────────────▶│ PTY master  │
//!   stream    └──────────────┘                      │   + shell   │
//!             ┌──────────────┐  output frames       │             │
//!  WebSocket ◀┤ writer task  │◀──── mpsc ◀── pump ──┤             │
//!   sink      └──────────────┘   (blocking thread)  └─────────────┘
//! ```
//!
//! The inbound loop and the pump share one cancellation token. Whichever
//! stops first cancels it, the other side follows, and teardown kills the
//! shell exactly once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::dispatcher::{decode_frame, Dispatcher};
use super::multiplexer::{Multiplexer, TmuxMultiplexer};
use super::pty::{self, LaunchedTerminal, ProcessHandle, ProcessStatus, TerminalIo};
use super::pump::run_output_pump;
use super::registry::{SessionGuard, SessionRegistry};
use crate::config::Config;

/// Capacity of the outbound frame channel.
const OUTBOUND_CAPACITY: usize = 256;

/// How long teardown waits for the pump thread after the shell is killed.
const PUMP_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error text sent when the shell cannot be started.
pub const LAUNCH_FAILED_MESSAGE: &str = "Failed to start terminal";

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Why the inbound loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InboundExit {
    /// The client closed the connection.
    ConnectionClosed,
    /// Receiving from the connection failed.
    TransportError,
    /// Writing to the shell failed.
    ProcessGone,
    /// The session token was cancelled.
    Cancelled,
}

/// One live terminal session.
struct Session {
    guard: SessionGuard,
    process: Arc<ProcessHandle>,
}

impl Session {
    fn token(&self) -> &CancellationToken {
        self.guard.token()
    }

    /// Kills and reaps the shell. Safe to call more than once.
    async fn teardown(&self) -> Option<ProcessStatus> {
        self.token().cancel();
        let process = Arc::clone(&self.process);
        match tokio::task::spawn_blocking(move || process.terminate()).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Teardown task failed");
                None
            }
        }
    }
}

/// Runs a terminal session on an upgraded WebSocket until either side ends.
pub async fn run_session(
    socket: WebSocket,
    peer: Option<SocketAddr>,
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
) {
    let (mut sink, stream) = socket.split();

    let guard = match registry.register(peer) {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(peer = ?peer, error = %e, "Refusing terminal session");
            let _ = send_frame(&mut sink, &ServerMessage::error(e.to_string())).await;
            close(&mut sink).await;
            return;
        }
    };

    let span = tracing::info_span!("session", session_id = %guard.id());
    bridge(sink, stream, guard, config).instrument(span).await;
}

async fn bridge(mut sink: WsSink, stream: WsStream, guard: SessionGuard, config: Arc<Config>) {
    let LaunchedTerminal {
        terminal,
        reader,
        process,
    } = match pty::launch(&config.terminal) {
        Ok(launched) => launched,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start PTY");
            let _ = send_frame(&mut sink, &ServerMessage::error(LAUNCH_FAILED_MESSAGE)).await;
            close(&mut sink).await;
            return;
        }
    };

    guard.set_pid(process.pid());
    tracing::info!(pid = ?process.pid(), "Terminal session started");

    let session = Session { guard, process };
    let token = session.token().clone();
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

    if !config.terminal.welcome_banner.is_empty() {
        let _ = tx
            .send(ServerMessage::output(config.terminal.welcome_banner.as_str()))
            .await;
    }

    let writer = tokio::spawn(write_loop(sink, rx, token.clone()).in_current_span());

    let pump = {
        let tx = tx.clone();
        let token = token.clone();
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            run_output_pump(reader, tx, token)
        })
    };

    let dispatcher = Dispatcher::new(
        terminal,
        TmuxMultiplexer::new(config.multiplexer.binary.as_str()),
        config.multiplexer.clone(),
        tx,
    );
    let exit = inbound_loop(stream, dispatcher, &token).await;
    tracing::debug!(reason = ?exit, "Inbound loop stopped");

    let status = session.teardown().await;

    match tokio::time::timeout(PUMP_EXIT_TIMEOUT, pump).await {
        Ok(Ok(reason)) => tracing::debug!(reason = ?reason, "Output pump joined"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Output pump panicked"),
        Err(_) => tracing::warn!("Output pump still blocked after teardown"),
    }

    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "Writer task failed");
    }

    tracing::info!(status = ?status, "Terminal session ended");
}

/// Receives frames until the connection ends, the shell input breaks or
/// the session is cancelled. Malformed frames are dropped.
async fn inbound_loop<T: TerminalIo, M: Multiplexer>(
    mut stream: WsStream,
    mut dispatcher: Dispatcher<T, M>,
    token: &CancellationToken,
) -> InboundExit {
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => return InboundExit::Cancelled,
            frame = stream.next() => frame,
        };

        let message = match frame {
            Some(Ok(Message::Text(text))) => decode_frame(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => decode_frame(&data),
            Some(Ok(Message::Close(_))) | None => return InboundExit::ConnectionClosed,
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket read error");
                return InboundExit::TransportError;
            }
        };

        let Some(message) = message else {
            continue;
        };

        // A full input queue must not hold off cancellation.
        let result = tokio::select! {
            _ = token.cancelled() => return InboundExit::Cancelled,
            result = dispatcher.dispatch(message) => result,
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "Shell input closed");
            return InboundExit::ProcessGone;
        }
    }
}

/// Owns the WebSocket sink. Drains queued frames, then closes the
/// connection once every sender is gone or the session is cancelled.
async fn write_loop(
    mut sink: WsSink,
    mut rx: mpsc::Receiver<ServerMessage>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            message = rx.recv() => match message {
                Some(message) => {
                    if let Err(e) = send_frame(&mut sink, &message).await {
                        tracing::debug!(error = %e, "WebSocket write error");
                        token.cancel();
                        return;
                    }
                }
                None => break,
            },
            _ = token.cancelled() => {
                while let Ok(message) = rx.try_recv() {
                    if send_frame(&mut sink, &message).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }

    close(&mut sink).await;
}

async fn send_frame(sink: &mut WsSink, message: &ServerMessage) -> Result<(), axum::Error> {
    match message.to_json() {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode frame");
            Ok(())
        }
    }
}

async fn close(sink: &mut WsSink) {
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: "".into(),
    };
    if sink.send(Message::Close(Some(frame))).await.is_ok() {
        let _ = sink.close().await;
    }
}
