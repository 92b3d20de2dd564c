//! WebSocket proxy orchestration.
//!
//! # Responsibilities
//! - Turn a detected upgrade into a `ProxySession` (id, corrected target, filtered headers)
//! - Build the upstream handshake request and dial it
//! - Hand both legs to a `ProxyRelay`, or reject the client when the dial fails
//!
//! # Design Decisions
//! - The client upgrade is accepted before the upstream is dialed; a failed dial is
//!   reported to the client as a 1002 close rather than an HTTP error
//! - Every sub-protocol the client requested is offered upstream in client order
//! - Dial failures are not retried

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use axum::http::header::SEC_WEBSOCKET_PROTOCOL;
use axum::http::{HeaderMap, HeaderValue, Uri};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::observability::metrics;
use crate::security::headers::{HeaderFilterChain, RequestContext};
use crate::websocket::error::ProxyError;
use crate::websocket::frame::{client_transport, upstream_transport};
use crate::websocket::registry::SessionRegistry;
use crate::websocket::relay::{ProxyRelay, RelayReport};
use crate::websocket::upgrade::{correct_uri, requested_subprotocols};

/// Close reason sent to the client when the upstream cannot be reached.
const DIAL_FAILED_REASON: &str = "upstream unavailable";

/// Tunables for proxied sessions.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Upper bound on upstream connect + handshake.
    pub connect_timeout: Duration,
    /// Drain window once a session starts closing.
    pub close_timeout: Duration,
    /// Largest message accepted on either leg.
    pub max_message_size: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(5),
            max_message_size: 64 << 20,
        }
    }
}

impl ProxySettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            close_timeout: Duration::from_secs(config.timeouts.close_secs),
            max_message_size: config.websocket.max_message_size,
        }
    }
}

/// One upgrade request, ready to be dialed.
#[derive(Debug, Clone)]
pub struct ProxySession {
    /// Client session id, also the registry key.
    pub id: String,
    /// Upstream target with its scheme already corrected to ws/wss.
    pub target: Uri,
    /// Requested sub-protocols in client order.
    pub subprotocols: Vec<String>,
    /// Client headers after the WebSocket filter chain.
    pub headers: HeaderMap,
}

/// Upstream connection produced by a successful dial.
pub type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials upstreams and relays sessions. One instance per gateway.
#[derive(Debug)]
pub struct WebSocketProxy {
    registry: Arc<SessionRegistry>,
    settings: ProxySettings,
    filters: HeaderFilterChain,
}

impl WebSocketProxy {
    /// Runs after route resolution and just before the HTTP forwarder.
    pub const ORDER: i32 = i32::MAX - 2;

    pub fn new(registry: Arc<SessionRegistry>, settings: ProxySettings) -> Self {
        Self {
            registry,
            settings,
            filters: HeaderFilterChain::websocket_default(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// Assign a session id and capture what the upstream handshake needs.
    pub fn prepare_session(&self, target: &Uri, headers: &HeaderMap, ctx: &RequestContext) -> ProxySession {
        ProxySession {
            id: Uuid::new_v4().to_string(),
            target: correct_uri(target),
            subprotocols: requested_subprotocols(headers),
            headers: self.filters.apply(headers, ctx),
        }
    }

    /// Build the upstream handshake request.
    ///
    /// tungstenite generates `Host` and the handshake headers from the target;
    /// filtered client headers are layered on top, replacing same-named ones.
    pub fn upstream_request(session: &ProxySession) -> Result<Request, ProxyError> {
        let mut request = session
            .target
            .clone()
            .into_client_request()
            .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

        let headers = request.headers_mut();
        for name in session.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in session.headers.iter() {
            headers.append(name.clone(), value.clone());
        }

        if !session.subprotocols.is_empty() {
            let offered = HeaderValue::from_str(&session.subprotocols.join(", "))
                .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
            headers.insert(SEC_WEBSOCKET_PROTOCOL, offered);
        }
        Ok(request)
    }

    /// Connect and complete the upstream handshake within `connect_timeout`.
    pub async fn dial(&self, session: &ProxySession) -> Result<UpstreamStream, ProxyError> {
        let dial_error = |reason: String| ProxyError::UpstreamDial {
            uri: session.target.to_string(),
            reason,
        };

        let request = Self::upstream_request(session)?;
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.settings.max_message_size);

        let connect = tokio_tungstenite::connect_async_with_config(request, Some(config), true);
        match tokio::time::timeout(self.settings.connect_timeout, connect).await {
            Ok(Ok((stream, response))) => {
                tracing::debug!(status = %response.status(), "Upstream handshake complete");
                Ok(stream)
            }
            Ok(Err(e)) => Err(dial_error(e.to_string())),
            Err(_) => Err(dial_error(format!(
                "timed out after {:?}",
                self.settings.connect_timeout
            ))),
        }
    }

    /// Dial the upstream for an accepted client socket and relay until the session ends.
    ///
    /// Returns `None` when the dial failed and the client was rejected.
    pub async fn serve(&self, socket: WebSocket, session: ProxySession) -> Option<RelayReport> {
        let span = tracing::info_span!(
            "ws_session",
            session_id = %session.id,
            upstream = %session.target
        );

        async move {
            let relay = ProxyRelay::new(
                session.id.clone(),
                self.registry.clone(),
                self.settings.close_timeout,
            );
            let client = client_transport(socket);

            match self.dial(&session).await {
                Ok(upstream) => Some(relay.run(client, upstream_transport(upstream)).await),
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream dial failed, rejecting client");
                    metrics::ws_dial_failed();
                    relay.reject(client, DIAL_FAILED_REASON).await;
                    None
                }
            }
        }
        .instrument(span)
        .await
    }
}
