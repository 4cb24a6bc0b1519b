//! Window-size adapter.
//!
//! Maps a validated `resize` request onto the PTY so the line discipline
//! and full-screen programs inside the shell reflow.

use portable_pty::{MasterPty, PtySize};
use protocol::{ResizeRequest, WindowSize};

use super::pty::SessionError;

/// Validates a wire resize request. Non-positive or oversized dimensions
/// yield `None` and the request is dropped.
pub fn requested_size(request: &ResizeRequest) -> Option<WindowSize> {
    request.window_size()
}

/// Applies the window size to the PTY master.
pub fn apply_window_size(master: &dyn MasterPty, size: WindowSize) -> Result<(), SessionError> {
    master
        .resize(PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| SessionError::ResizeFailed(e.to_string()))?;

    tracing::debug!(cols = size.cols, rows = size.rows, "Resized PTY");
    Ok(())
}
