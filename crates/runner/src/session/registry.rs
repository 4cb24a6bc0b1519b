//! Registry of live terminal sessions.
//!
//! Tracks every session for the session limit and for server shutdown.
//! Each registration returns a [`SessionGuard`]; dropping the guard removes
//! the entry, so a session leaves the registry exactly once however its
//! connection ends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a session.
pub type SessionId = String;

/// Errors returned when registering a session.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The configured session limit is reached.
    #[error("too many active sessions (limit {0})")]
    LimitReached(usize),

    /// The server is shutting down.
    #[error("server is shutting down")]
    ShuttingDown,
}

/// Information about a live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: SessionId,
    /// Remote address of the connection, when known.
    pub peer: Option<SocketAddr>,
    /// Process ID of the shell, once launched.
    pub pid: Option<u32>,
    /// When the connection was accepted.
    pub started_at: DateTime<Utc>,
}

/// Thread-safe session registry using DashMap.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionInfo>,
    active: AtomicUsize,
    max_sessions: usize,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    /// Creates a registry admitting at most `max_sessions` sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            active: AtomicUsize::new(0),
            max_sessions,
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers a new session.
    ///
    /// The returned guard carries a cancellation token that fires when the
    /// whole registry shuts down.
    pub fn register(
        self: &Arc<Self>,
        peer: Option<SocketAddr>,
    ) -> Result<SessionGuard, RegistryError> {
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::ShuttingDown);
        }

        let max = self.max_sessions;
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| RegistryError::LimitReached(max))?;

        let id = Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            SessionInfo {
                id: id.clone(),
                peer,
                pid: None,
                started_at: Utc::now(),
            },
        );

        tracing::debug!(session_id = %id, active = self.count(), "Registered session");

        Ok(SessionGuard {
            registry: Arc::clone(self),
            id,
            token: self.shutdown.child_token(),
        })
    }

    /// Returns the number of live sessions.
    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Lists all live sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Cancels every session and refuses new ones.
    pub fn shutdown_all(&self) {
        tracing::info!(active = self.count(), "Shutting down all sessions");
        for info in self.list() {
            tracing::debug!(
                session_id = %info.id,
                peer = ?info.peer,
                pid = ?info.pid,
                started_at = %info.started_at,
                "Cancelling session"
            );
        }
        self.shutdown.cancel();
    }

    fn remove(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(session_id = %id, "Removed session");
        }
    }
}

/// Registration of one session; unregisters on drop.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
    token: CancellationToken,
}

impl SessionGuard {
    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the session's shutdown token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Records the shell's process ID.
    pub fn set_pid(&self, pid: Option<u32>) {
        if let Some(mut entry) = self.registry.sessions.get_mut(&self.id) {
            entry.pid = pid;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
