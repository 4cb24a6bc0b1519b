//! # Command Runner
//!
//! Remote interactive shell over WebSocket, plus a one-shot command
//! endpoint.
//!
//! ## Overview
//!
//! Each WebSocket connection on `/terminal` gets its own shell on a
//! pseudo-terminal. Keystrokes flow in as `input` frames, terminal output
//! flows back as `output` frames. The first Enter pressed in a fresh
//! session attaches to (or creates) a tmux session, so the browser client
//! gets tabs and split panes without any client-side state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     axum Router                          │
//! │   /terminal (WS)        /run (POST)       /health        │
//! ├──────────────┬───────────────────────────────────────────┤
//! │  Session     │  Dispatcher ── Bootstrap state machine    │
//! │  Bridge      │     │                                     │
//! │              │     ├── PTY input / resize                │
//! │              │     └── tmux (typed lines, admin cmds)    │
//! │              │  Output Pump ◀── PTY master               │
//! ├──────────────┴───────────────────────────────────────────┤
//! │                  Session Registry                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runner::{server, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let listener = tokio::net::TcpListener::bind(config.server.socket_addr()?).await?;
//!     let state = server::AppState::new(config);
//!     server::serve(listener, state, server::shutdown_signal()).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration loading and defaults
//! - [`logging`]: tracing subscriber setup
//! - [`session`]: PTY sessions and their bridge to the connection
//! - [`server`]: HTTP routes and serving

pub mod config;
pub mod logging;
pub mod server;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

pub use config::{Config, ConfigError};
pub use server::{AppState, HealthStatus};
pub use session::{SessionError, SessionId, SessionInfo, SessionRegistry};
