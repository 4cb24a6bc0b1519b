//! Terminal WebSocket endpoint.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;

use super::AppState;
use crate::session::run_session;

/// `GET /terminal`: upgrades to a WebSocket and runs one terminal session.
pub async fn terminal_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    tracing::debug!(peer = %peer, "Terminal connection requested");

    ws.on_failed_upgrade(move |e| {
        tracing::warn!(peer = %peer, error = %e, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| run_session(socket, Some(peer), state.config, state.registry))
}
