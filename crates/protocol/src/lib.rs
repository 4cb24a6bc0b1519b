//! # Command Runner Protocol Library
//!
//! Frame definitions for the terminal WebSocket of the command runner.
//!
//! ## Overview
//!
//! A terminal session exchanges JSON text frames shaped as
//! `{"type": <tag>, "data": <payload>}`:
//!
//! ```text
//! client → server   input | resize | tmux | tmux_command
//! server → client   output | error
//! ```
//!
//! Each tag has exactly one payload type. Decoding checks the payload
//! structurally, so callers never inspect untyped JSON.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ClientMessage, ServerMessage, WindowSize};
//!
//! let frame = r#"{"type":"resize","data":{"cols":120,"rows":40}}"#;
//! let ClientMessage::Resize(request) = ClientMessage::from_json(frame).unwrap() else {
//!     unreachable!();
//! };
//! assert_eq!(request.window_size(), Some(WindowSize { cols: 120, rows: 40 }));
//!
//! let reply = ServerMessage::output("$ ").to_json().unwrap();
//! assert_eq!(reply, r#"{"type":"output","data":"$ "}"#);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Frame definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{ClientMessage, ResizeRequest, ServerMessage, WindowSize};
