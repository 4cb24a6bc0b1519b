//! Terminal session module.
//!
//! A session is one WebSocket connection bridged to one shell running on a
//! PTY. The pieces:
//!
//! - [`pty`]: launching the shell and owning its process
//! - [`pump`]: PTY output to `output` frames
//! - [`dispatcher`]: inbound frames to PTY input, resizes and tmux actions
//! - [`bootstrap`]: the tmux attach-or-create state machine
//! - [`bridge`]: wiring the above together for one connection
//! - [`registry`]: the set of live sessions

pub mod bootstrap;
pub mod bridge;
pub mod dispatcher;
pub mod multiplexer;
pub mod pty;
pub mod pump;
pub mod registry;
pub mod resize;

pub use bootstrap::{BootstrapAction, BootstrapEvent, BootstrapState};
pub use bridge::run_session;
pub use dispatcher::Dispatcher;
pub use multiplexer::{Multiplexer, MultiplexerError, TmuxMultiplexer};
pub use pty::{LaunchError, ProcessHandle, ProcessStatus, PtyTerminal, SessionError, TerminalIo};
pub use pump::{PumpExit, Utf8Decoder};
pub use registry::{RegistryError, SessionGuard, SessionId, SessionInfo, SessionRegistry};
