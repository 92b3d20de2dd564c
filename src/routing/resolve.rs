//! Route resolution middleware.
//!
//! Runs first in the gateway chain: picks the route for the request and records
//! the resolved upstream URI in request extensions for later stages.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::routing::router::ProxyRouter;

/// Position of route resolution in the filter chain.
pub const ORDER: i32 = 10_000;

/// Route table shared with the config reloader.
pub type SharedRouter = Arc<ArcSwap<ProxyRouter>>;

/// Upstream chosen for a request.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub uri: Uri,
    pub route_name: String,
    pub preserve_host: bool,
}

/// Marker set by the stage that takes ownership of a request.
#[derive(Debug, Clone, Copy)]
pub struct AlreadyRouted;

/// Resolve the target URI or answer 404.
pub async fn route_to_request_url(
    State(routes): State<SharedRouter>,
    mut request: Request,
    next: Next,
) -> Response {
    let target = {
        let router = routes.load();
        router
            .match_request(request.uri(), request.headers())
            .map(|route| ResolvedTarget {
                uri: route.resolve(request.uri()),
                route_name: route.name.clone(),
                preserve_host: route.preserve_host,
            })
    };

    match target {
        Some(target) => {
            tracing::debug!(route = %target.route_name, target = %target.uri, "Route resolved");
            request.extensions_mut().insert(target);
            next.run(request).await
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "No route matched");
            (StatusCode::NOT_FOUND, "No matching route found").into_response()
        }
    }
}
