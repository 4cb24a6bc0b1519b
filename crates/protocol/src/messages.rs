//! Terminal frame definitions.
//!
//! Every frame on the terminal WebSocket is a JSON object of the form
//! `{"type": <tag>, "data": <payload>}`. The payload shape is fixed per tag,
//! so a frame whose payload does not match its tag fails to decode.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Frames sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Raw keystrokes for the shell.
    Input(String),
    /// New terminal geometry.
    Resize(ResizeRequest),
    /// A single key to send after the multiplexer's control prefix.
    Tmux(String),
    /// An administrative multiplexer command line, tokenized on whitespace.
    TmuxCommand(String),
}

impl ClientMessage {
    /// Decodes a frame from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decodes a frame from raw bytes, which must be UTF-8 JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        Self::from_json(text)
    }

    /// Encodes the frame as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the wire tag of this frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Input(_) => "input",
            ClientMessage::Resize(_) => "resize",
            ClientMessage::Tmux(_) => "tmux",
            ClientMessage::TmuxCommand(_) => "tmux_command",
        }
    }
}

/// Frames sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Terminal output.
    Output(String),
    /// A failure the client should show to the user.
    Error(String),
}

impl ServerMessage {
    /// Creates an output frame.
    pub fn output(data: impl Into<String>) -> Self {
        ServerMessage::Output(data.into())
    }

    /// Creates an error frame.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(message.into())
    }

    /// Encodes the frame as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a frame from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Payload of a `resize` frame as it appears on the wire.
///
/// The fields are signed so that zero and negative values decode and can be
/// rejected by [`ResizeRequest::window_size`] instead of failing the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    /// Requested terminal columns.
    pub cols: i64,
    /// Requested terminal rows.
    pub rows: i64,
}

impl ResizeRequest {
    /// Returns the validated window size, or `None` when either dimension
    /// is not a positive value that fits a terminal dimension.
    pub fn window_size(&self) -> Option<WindowSize> {
        if self.cols <= 0 || self.rows <= 0 {
            return None;
        }
        let cols = u16::try_from(self.cols).ok()?;
        let rows = u16::try_from(self.rows).ok()?;
        Some(WindowSize { cols, rows })
    }
}

/// A validated terminal geometry. Both dimensions are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSize {
    /// Terminal width in columns.
    pub cols: u16,
    /// Terminal height in rows.
    pub rows: u16,
}
