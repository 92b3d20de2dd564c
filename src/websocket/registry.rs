//! Registry of active proxied sessions.
//!
//! # Responsibilities
//! - Track one `SessionPair` per client session id
//! - Hand out close capability for administrative and shutdown closes
//! - Provide snapshots of active ids without exposing the map
//!
//! # Design Decisions
//! - `DashMap` shards the map; no global lock on the hot path
//! - The registry owns close handles only, never the sockets themselves
//! - Map guards are never held across an `.await`
//! - Each insert gets a generation so a finished relay can only remove its own pair

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};

use crate::websocket::close::CloseEvent;
use crate::websocket::error::ProxyError;

/// Which leg of a session a handle controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Upstream,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Upstream => write!(f, "upstream"),
        }
    }
}

/// A request to close one leg, acknowledged once the close frame is handed to the
/// transport.
#[derive(Debug)]
pub struct CloseRequest {
    pub event: CloseEvent,
    pub done: oneshot::Sender<()>,
}

/// Upper bound on `ConnectionHandle::close` unless the relay sets its own.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Close capability for one leg of a relay.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    session_id: String,
    side: Side,
    control: mpsc::Sender<CloseRequest>,
    ack_timeout: Duration,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the owning relay task listens on.
    pub fn new(session_id: impl Into<String>, side: Side) -> (Self, mpsc::Receiver<CloseRequest>) {
        let (control, requests) = mpsc::channel(1);
        let handle = Self {
            session_id: session_id.into(),
            side,
            control,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        };
        (handle, requests)
    }

    /// Bound how long `close` waits for the relay.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// False once the relay task behind this handle has finished.
    pub fn is_open(&self) -> bool {
        !self.control.is_closed()
    }

    /// Initiate a close of this leg and wait until the close frame went out.
    ///
    /// Resolves immediately if the leg already finished, and after the ack
    /// timeout if the relay never answers.
    pub async fn close(&self, event: CloseEvent) {
        let (done, acked) = oneshot::channel();
        let request = async {
            if self.control.send(CloseRequest { event, done }).await.is_ok() {
                let _ = acked.await;
            }
        };
        if tokio::time::timeout(self.ack_timeout, request).await.is_err() {
            tracing::warn!(
                session_id = %self.session_id,
                side = %self.side,
                timeout = ?self.ack_timeout,
                "Close not acknowledged in time"
            );
        }
    }
}

/// The registry entry binding both legs of one session.
#[derive(Debug, Clone)]
pub struct SessionPair {
    pub client: ConnectionHandle,
    pub upstream: ConnectionHandle,
    generation: u64,
}

impl SessionPair {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Concurrent store of active session pairs keyed by client session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionPair>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the pair for `session_id`. Returns the pair's generation.
    ///
    /// A replaced pair is dropped whole; the new pair never inherits from it.
    pub fn add(
        &self,
        session_id: impl Into<String>,
        client: ConnectionHandle,
        upstream: ConnectionHandle,
    ) -> u64 {
        let session_id = session_id.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let pair = SessionPair {
            client,
            upstream,
            generation,
        };
        if self.sessions.insert(session_id.clone(), pair).is_some() {
            tracing::warn!(session_id = %session_id, "Replaced existing session pair");
        }
        tracing::debug!(session_id = %session_id, generation, "Session registered");
        generation
    }

    /// Remove the pair and return its upstream handle. A second call is a no-op.
    pub fn remove(&self, session_id: &str) -> Option<ConnectionHandle> {
        self.sessions
            .remove(session_id)
            .map(|(_, pair)| pair.upstream)
    }

    /// Remove the pair only if it is still the one registered under `generation`.
    pub fn release(&self, session_id: &str, generation: u64) -> bool {
        self.sessions
            .remove_if(session_id, |_, pair| pair.generation == generation)
            .is_some()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionPair> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Initiate a normal closure of the session's upstream leg.
    pub async fn close_by_id(&self, session_id: &str) -> Result<(), ProxyError> {
        // Clone the handle out so the shard lock is released before awaiting.
        let upstream = self
            .sessions
            .get(session_id)
            .map(|entry| entry.upstream.clone())
            .ok_or_else(|| ProxyError::SessionNotFound(session_id.to_string()))?;

        tracing::info!(session_id = %session_id, "Closing session on request");
        upstream.close(CloseEvent::normal()).await;
        Ok(())
    }

    /// Close the upstream leg of every tracked session concurrently.
    pub async fn close_all(&self, event: CloseEvent) {
        let handles: Vec<ConnectionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.upstream.clone())
            .collect();
        if handles.is_empty() {
            return;
        }

        tracing::info!(sessions = handles.len(), code = event.code, "Closing all sessions");
        join_all(handles.iter().map(|handle| handle.close(event.clone()))).await;
    }

    /// Sorted snapshot of active session ids.
    pub fn list_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
