//! Control-plane dispatcher.
//!
//! Routes decoded client frames to the PTY, the window-size adapter, the
//! bootstrap state machine and the multiplexer. The dispatcher is the only
//! writer to the process input; it processes frames strictly in arrival
//! order.

use std::collections::VecDeque;

use protocol::{ClientMessage, ResizeRequest, ServerMessage};
use tokio::sync::mpsc;

use super::bootstrap::{transition, BootstrapAction, BootstrapEvent, BootstrapState};
use super::multiplexer::{tokenize, Multiplexer};
use super::pty::{SessionError, TerminalIo};
use super::resize::requested_size;
use crate::config::MultiplexerConfig;

/// Carriage return followed by "erase to end of line".
pub const CLEAR_LINE: &[u8] = b"\r\x1b[K";

/// Decodes one inbound frame, logging and dropping anything malformed.
pub fn decode_frame(bytes: &[u8]) -> Option<ClientMessage> {
    match ClientMessage::from_slice(bytes) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed frame");
            None
        }
    }
}

/// Per-session dispatcher state.
pub struct Dispatcher<T: TerminalIo, M: Multiplexer> {
    terminal: T,
    multiplexer: M,
    config: MultiplexerConfig,
    bootstrap: BootstrapState,
    outbound: mpsc::Sender<ServerMessage>,
}

impl<T: TerminalIo, M: Multiplexer> Dispatcher<T, M> {
    /// Creates a dispatcher in the `NotStarted` bootstrap state.
    pub fn new(
        terminal: T,
        multiplexer: M,
        config: MultiplexerConfig,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            terminal,
            multiplexer,
            config,
            bootstrap: BootstrapState::NotStarted,
            outbound,
        }
    }

    /// Returns the current bootstrap state.
    pub fn bootstrap_state(&self) -> BootstrapState {
        self.bootstrap
    }

    /// Handles one frame.
    ///
    /// Returns an error only when the process input can no longer be
    /// written, which ends the session.
    pub async fn dispatch(&mut self, message: ClientMessage) -> Result<(), SessionError> {
        tracing::trace!(kind = message.kind(), "Dispatching frame");

        match message {
            ClientMessage::Input(data) => self.handle_input(&data).await,
            ClientMessage::Resize(request) => {
                self.handle_resize(&request);
                Ok(())
            }
            ClientMessage::Tmux(key) => self.handle_tmux_key(&key).await,
            ClientMessage::TmuxCommand(line) => {
                self.handle_tmux_command(&line).await;
                Ok(())
            }
        }
    }

    async fn handle_input(&mut self, data: &str) -> Result<(), SessionError> {
        let (next, actions) = transition(self.bootstrap, BootstrapEvent::Input(data));
        if next != self.bootstrap {
            tracing::debug!(from = ?self.bootstrap, to = ?next, "Starting multiplexer");
        }
        self.bootstrap = next;
        self.run_actions(actions).await
    }

    async fn run_actions(&mut self, actions: Vec<BootstrapAction>) -> Result<(), SessionError> {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            match action {
                BootstrapAction::Forward(data) => {
                    self.terminal.write_input(data.as_bytes()).await?
                }
                BootstrapAction::ClearLine => self.terminal.write_input(CLEAR_LINE).await?,
                BootstrapAction::ProbeSession => {
                    let exists = self
                        .multiplexer
                        .has_session(&self.config.session_name)
                        .await;
                    let (next, follow_up) =
                        transition(self.bootstrap, BootstrapEvent::SessionProbed { exists });
                    self.bootstrap = next;
                    queue.extend(follow_up);
                }
                BootstrapAction::AttachSession => {
                    let line = format!(
                        "{} attach -t {}\r",
                        self.config.binary, self.config.session_name
                    );
                    tracing::debug!(session = %self.config.session_name, "Attaching to multiplexer session");
                    self.terminal.write_input(line.as_bytes()).await?;
                }
                BootstrapAction::CreateSession => {
                    let line = format!(
                        "{} new-session -s {}\r",
                        self.config.binary, self.config.session_name
                    );
                    tracing::debug!(session = %self.config.session_name, "Creating multiplexer session");
                    self.terminal.write_input(line.as_bytes()).await?;
                }
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, request: &ResizeRequest) {
        let Some(size) = requested_size(request) else {
            tracing::debug!(cols = request.cols, rows = request.rows, "Dropping invalid resize");
            return;
        };

        if let Err(e) = self.terminal.resize(size) {
            tracing::warn!(error = %e, "Resize failed");
        }
    }

    async fn handle_tmux_key(&mut self, key: &str) -> Result<(), SessionError> {
        if !self.bootstrap.is_started() {
            tracing::debug!(state = ?self.bootstrap, "Dropping tmux key before multiplexer start");
            return Ok(());
        }

        let mut bytes = Vec::with_capacity(key.len() + 1);
        bytes.push(self.config.prefix_key);
        bytes.extend_from_slice(key.as_bytes());
        self.terminal.write_input(&bytes).await
    }

    async fn handle_tmux_command(&mut self, line: &str) {
        if !self.bootstrap.is_started() {
            tracing::debug!(state = ?self.bootstrap, "Dropping tmux command before multiplexer start");
            return;
        }

        if let Err(e) = self.multiplexer.run_command(tokenize(line)).await {
            tracing::error!(cmd = %line, error = %e, "Failed to run tmux command");
            let message = ServerMessage::error(format!("tmux command failed: {}", e));
            if self.outbound.send(message).await.is_err() {
                tracing::debug!("Outbound channel closed, dropping frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::multiplexer::MultiplexerError;
    use protocol::WindowSize;
    use std::sync::{Arc, Mutex};

    /// Everything the dispatcher did to the terminal.
    #[derive(Default)]
    struct Recorded {
        input: Vec<u8>,
        resizes: Vec<WindowSize>,
    }

    #[derive(Clone, Default)]
    struct RecordingTerminal {
        recorded: Arc<Mutex<Recorded>>,
        fail_writes: bool,
    }

    impl RecordingTerminal {
        fn input(&self) -> Vec<u8> {
            self.recorded.lock().unwrap().input.clone()
        }

        fn resizes(&self) -> Vec<WindowSize> {
            self.recorded.lock().unwrap().resizes.clone()
        }
    }

    impl TerminalIo for RecordingTerminal {
        async fn write_input(&mut self, data: &[u8]) -> Result<(), SessionError> {
            if self.fail_writes {
                return Err(SessionError::WriteFailed("broken pipe".to_string()));
            }
            self.recorded.lock().unwrap().input.extend_from_slice(data);
            Ok(())
        }

        fn resize(&mut self, size: WindowSize) -> Result<(), SessionError> {
            self.recorded.lock().unwrap().resizes.push(size);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeMultiplexer {
        session_exists: bool,
        fail_commands: bool,
        probes: Arc<Mutex<Vec<String>>>,
        commands: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Multiplexer for FakeMultiplexer {
        async fn has_session(&self, name: &str) -> bool {
            self.probes.lock().unwrap().push(name.to_string());
            self.session_exists
        }

        async fn run_command(&self, args: Vec<String>) -> Result<(), MultiplexerError> {
            if args.is_empty() {
                return Err(MultiplexerError::EmptyCommand);
            }
            self.commands.lock().unwrap().push(args);
            if self.fail_commands {
                Err(MultiplexerError::Spawn {
                    binary: "tmux".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                })
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        dispatcher: Dispatcher<RecordingTerminal, FakeMultiplexer>,
        terminal: RecordingTerminal,
        multiplexer: FakeMultiplexer,
        outbound: mpsc::Receiver<ServerMessage>,
    }

    fn harness(multiplexer: FakeMultiplexer) -> Harness {
        let terminal = RecordingTerminal::default();
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            terminal.clone(),
            multiplexer.clone(),
            MultiplexerConfig::default(),
            tx,
        );
        Harness {
            dispatcher,
            terminal,
            multiplexer,
            outbound: rx,
        }
    }

    fn input(data: &str) -> ClientMessage {
        ClientMessage::Input(data.to_string())
    }

    #[tokio::test]
    async fn test_first_carriage_return_creates_session() {
        let mut h = harness(FakeMultiplexer::default());

        h.dispatcher.dispatch(input("\r")).await.unwrap();

        assert_eq!(h.dispatcher.bootstrap_state(), BootstrapState::Started);
        assert_eq!(h.terminal.input(), b"\r\x1b[Ktmux new-session -s default\r");
        assert_eq!(*h.multiplexer.probes.lock().unwrap(), vec!["default"]);
    }

    #[tokio::test]
    async fn test_first_carriage_return_attaches_existing_session() {
        let mut h = harness(FakeMultiplexer {
            session_exists: true,
            ..FakeMultiplexer::default()
        });

        h.dispatcher.dispatch(input("\r")).await.unwrap();

        assert_eq!(h.dispatcher.bootstrap_state(), BootstrapState::Started);
        assert_eq!(h.terminal.input(), b"\r\x1b[Ktmux attach -t default\r");
    }

    #[tokio::test]
    async fn test_input_after_start_written_verbatim() {
        let mut h = harness(FakeMultiplexer::default());

        h.dispatcher.dispatch(input("\r")).await.unwrap();
        let before = h.terminal.input().len();
        h.dispatcher.dispatch(input("ls\r")).await.unwrap();
        h.dispatcher.dispatch(input("\r")).await.unwrap();

        assert_eq!(&h.terminal.input()[before..], b"ls\r\r");
        assert_eq!(h.multiplexer.probes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prior_input_forwarded_and_keeps_not_started() {
        let mut h = harness(FakeMultiplexer::default());

        for data in ["e", "c", "h", "o", " hi", "\r\n"] {
            h.dispatcher.dispatch(input(data)).await.unwrap();
        }

        assert_eq!(h.dispatcher.bootstrap_state(), BootstrapState::NotStarted);
        assert_eq!(h.terminal.input(), b"echo hi\r\n");
        assert!(h.multiplexer.probes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resize_applied() {
        let mut h = harness(FakeMultiplexer::default());

        h.dispatcher
            .dispatch(ClientMessage::Resize(ResizeRequest { cols: 120, rows: 40 }))
            .await
            .unwrap();

        assert_eq!(h.terminal.resizes(), vec![WindowSize { cols: 120, rows: 40 }]);
    }

    #[tokio::test]
    async fn test_invalid_resize_dropped() {
        let mut h = harness(FakeMultiplexer::default());

        for (cols, rows) in [(0, 40), (120, 0), (-3, 10), (100_000, 10)] {
            h.dispatcher
                .dispatch(ClientMessage::Resize(ResizeRequest { cols, rows }))
                .await
                .unwrap();
        }

        assert!(h.terminal.resizes().is_empty());
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tmux_messages_ignored_before_start() {
        let mut h = harness(FakeMultiplexer::default());

        h.dispatcher
            .dispatch(ClientMessage::Tmux("c".to_string()))
            .await
            .unwrap();
        h.dispatcher
            .dispatch(ClientMessage::TmuxCommand(
                "kill-session -t default".to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(h.dispatcher.bootstrap_state(), BootstrapState::NotStarted);
        assert!(h.terminal.input().is_empty());
        assert!(h.multiplexer.commands.lock().unwrap().is_empty());
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tmux_key_sends_prefix() {
        let mut h = harness(FakeMultiplexer::default());
        h.dispatcher.dispatch(input("\r")).await.unwrap();
        let before = h.terminal.input().len();

        h.dispatcher
            .dispatch(ClientMessage::Tmux("%".to_string()))
            .await
            .unwrap();

        assert_eq!(&h.terminal.input()[before..], b"\x02%");
        assert_eq!(h.dispatcher.bootstrap_state(), BootstrapState::Started);
    }

    #[tokio::test]
    async fn test_tmux_command_runs_tokenized() {
        let mut h = harness(FakeMultiplexer::default());
        h.dispatcher.dispatch(input("\r")).await.unwrap();

        h.dispatcher
            .dispatch(ClientMessage::TmuxCommand(
                "split-window  -h -t default".to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(
            *h.multiplexer.commands.lock().unwrap(),
            vec![vec!["split-window", "-h", "-t", "default"]]
        );
        assert!(h.outbound.try_recv().is_err());
        assert_eq!(h.dispatcher.bootstrap_state(), BootstrapState::Started);
    }

    #[tokio::test]
    async fn test_tmux_command_failure_reports_error() {
        let mut h = harness(FakeMultiplexer {
            fail_commands: true,
            ..FakeMultiplexer::default()
        });
        h.dispatcher.dispatch(input("\r")).await.unwrap();

        h.dispatcher
            .dispatch(ClientMessage::TmuxCommand("new-window".to_string()))
            .await
            .unwrap();

        match h.outbound.try_recv().unwrap() {
            ServerMessage::Error(text) => {
                assert!(text.starts_with("tmux command failed: "), "{text}");
            }
            other => panic!("expected error frame, got {other:?}"),
        }
        assert_eq!(h.dispatcher.bootstrap_state(), BootstrapState::Started);
    }

    #[tokio::test]
    async fn test_empty_tmux_command_reports_error() {
        let mut h = harness(FakeMultiplexer::default());
        h.dispatcher.dispatch(input("\r")).await.unwrap();

        h.dispatcher
            .dispatch(ClientMessage::TmuxCommand("   ".to_string()))
            .await
            .unwrap();

        assert_eq!(
            h.outbound.try_recv().unwrap(),
            ServerMessage::error("tmux command failed: empty command")
        );
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let (tx, _rx) = mpsc::channel(1);
        let terminal = RecordingTerminal {
            fail_writes: true,
            ..RecordingTerminal::default()
        };
        let mut dispatcher = Dispatcher::new(
            terminal,
            FakeMultiplexer::default(),
            MultiplexerConfig::default(),
            tx,
        );

        let result = dispatcher.dispatch(input("ls")).await;
        assert!(matches!(result, Err(SessionError::WriteFailed(_))));
    }

    #[tokio::test]
    async fn test_custom_multiplexer_config() {
        let terminal = RecordingTerminal::default();
        let (tx, _rx) = mpsc::channel(1);
        let config = MultiplexerConfig {
            binary: "/opt/tmux".to_string(),
            session_name: "slides".to_string(),
            prefix_key: 0x01,
        };
        let mut dispatcher =
            Dispatcher::new(terminal.clone(), FakeMultiplexer::default(), config, tx);

        dispatcher.dispatch(input("\r")).await.unwrap();
        dispatcher
            .dispatch(ClientMessage::Tmux("n".to_string()))
            .await
            .unwrap();

        assert_eq!(
            terminal.input(),
            b"\r\x1b[K/opt/tmux new-session -s slides\r\x01n"
        );
    }

    #[test]
    fn test_decode_frame_drops_malformed() {
        assert!(decode_frame(br#"{"type":"input","data":"x"}"#).is_some());
        assert!(decode_frame(br#"{"type":"unknown","data":"x"}"#).is_none());
        assert!(decode_frame(br#"{"type":"resize","data":"x"}"#).is_none());
        assert!(decode_frame(b"not json").is_none());
    }
}
