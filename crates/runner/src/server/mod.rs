//! HTTP and WebSocket front end.
//!
//! Routes:
//!
//! - `GET /terminal`: WebSocket terminal session
//! - `POST /run`: one-shot command execution
//! - `GET /health`, `GET /healthz`: liveness

pub mod error;
pub mod exec;
pub mod health;
pub mod terminal;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::session::SessionRegistry;

pub use error::AppError;
pub use exec::{run_command, CommandOutput, ExecError, ExecRequest, ExitOutcome};
pub use health::HealthStatus;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    /// Creates state with an empty session registry sized from the config.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.server.max_sessions));
        Self {
            config: Arc::new(config),
            registry,
        }
    }
}

/// Builds the application router.
///
/// The request timeout covers the plain HTTP routes only; terminal
/// sessions live as long as their connection.
pub fn router(state: AppState) -> Router {
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        state.config.server.request_timeout(),
    );

    let http = Router::new()
        .route("/run", post(exec::run_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::health_handler))
        .layer(timeout);

    Router::new()
        .route("/terminal", get(terminal::terminal_handler))
        .merge(http)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the application on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Failed to read listener address")?;
    tracing::info!(%addr, "Listening");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
    }
}
