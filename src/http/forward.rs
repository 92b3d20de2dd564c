//! Plain HTTP forwarding.
//!
//! Last stage of the gateway chain. Requests that reach it have a resolved
//! target and were not claimed by the WebSocket proxy.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::ResolvedTarget;
use crate::security::headers::RequestContext;

/// Position of the HTTP forwarder in the filter chain.
pub const ORDER: i32 = i32::MAX;

/// Forward the request to its resolved target and stream the response back.
pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let Some(target) = request.extensions().get::<ResolvedTarget>().cloned() else {
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ctx = RequestContext::new(request.headers(), target.preserve_host, client_addr);

    let (parts, body) = request.into_parts();
    let mut upstream = axum::http::Request::builder()
        .method(parts.method)
        .uri(target.uri.clone())
        .version(parts.version);
    if let Some(headers) = upstream.headers_mut() {
        *headers = state.http_filters.apply(&parts.headers, &ctx);
    }
    let upstream = match upstream.body(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, target = %target.uri, "Failed to build upstream request");
            metrics::record_request(method.as_str(), 500, start);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid upstream request").into_response();
        }
    };

    match state.client.request(upstream).await {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), start);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(error = %e, route = %target.route_name, target = %target.uri, "Upstream error");
            metrics::record_request(method.as_str(), 502, start);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
