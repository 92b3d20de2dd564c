//! WebSocket upgrade routing.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests with a resolved target
//! - Complete the upgrade handshake with the client
//! - Hand the accepted socket to `WebSocketProxy::serve`
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Anything that is not a proxiable upgrade passes through untouched
//! - The requested sub-protocols are offered back to the client; the first one wins

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::routing::{AlreadyRouted, ResolvedTarget};
use crate::security::headers::RequestContext;
use crate::websocket::upgrade;
use crate::websocket::WebSocketProxy;

/// Claim upgrade requests for the WebSocket proxy.
pub async fn websocket_routing(
    State(proxy): State<Arc<WebSocketProxy>>,
    request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<AlreadyRouted>().is_some() {
        return next.run(request).await;
    }
    let Some(target) = request.extensions().get::<ResolvedTarget>().cloned() else {
        return next.run(request).await;
    };
    let Some(corrected) = upgrade::detect(request.headers(), &target.uri) else {
        return next.run(request).await;
    };
    if !upgrade::is_websocket_scheme(&corrected) {
        return next.run(request).await;
    }

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ctx = RequestContext::new(request.headers(), target.preserve_host, client_addr);
    let session = proxy.prepare_session(&corrected, request.headers(), &ctx);

    let (mut parts, _body) = request.into_parts();
    parts.extensions.insert(AlreadyRouted);
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Upgrade rejected");
            return rejection.into_response();
        }
    };

    tracing::info!(
        session_id = %session.id,
        route = %target.route_name,
        upstream = %session.target,
        subprotocols = ?session.subprotocols,
        "Upgrading WebSocket session"
    );

    ws.protocols(session.subprotocols.clone())
        .max_message_size(proxy.settings().max_message_size)
        .on_upgrade(move |socket| async move {
            proxy.serve(socket, session).await;
        })
}
