//! WebSocket upgrade detection and scheme correction.
//!
//! # Responsibilities
//! - Decide whether a request is a WebSocket upgrade (`Upgrade` + `Connection`)
//! - Rewrite a resolved `http`/`https` target into `ws`/`wss`
//! - Flatten the client's requested sub-protocols
//!
//! # Design Decisions
//! - Pure functions over headers and URIs; no request mutation
//! - Scheme correction is total and idempotent
//! - Sub-protocol order and duplicates are kept exactly as the client sent them

use axum::http::header::{CONNECTION, SEC_WEBSOCKET_PROTOCOL, UPGRADE};
use axum::http::uri::Scheme;
use axum::http::{HeaderMap, Uri};

/// True when `Upgrade: websocket` and the `Connection` tokens include `upgrade`.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    upgrade
        && headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Map `http` to `ws` and `https` to `wss`; any other scheme is returned unchanged.
pub fn correct_scheme(scheme: &str) -> String {
    if scheme.eq_ignore_ascii_case("http") {
        "ws".to_string()
    } else if scheme.eq_ignore_ascii_case("https") {
        "wss".to_string()
    } else {
        scheme.to_string()
    }
}

/// Apply `correct_scheme` to a URI, keeping authority, path and query.
pub fn correct_uri(uri: &Uri) -> Uri {
    let Some(scheme) = uri.scheme_str() else {
        return uri.clone();
    };
    let corrected = correct_scheme(scheme);
    if corrected == scheme {
        return uri.clone();
    }

    let mut parts = uri.clone().into_parts();
    parts.scheme = corrected.parse::<Scheme>().ok();
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}

/// The corrected target when `headers` describe a WebSocket upgrade.
pub fn detect(headers: &HeaderMap, target: &Uri) -> Option<Uri> {
    is_websocket_upgrade(headers).then(|| correct_uri(target))
}

/// True for `ws` and `wss` targets, the only ones the WebSocket proxy dials.
pub fn is_websocket_scheme(uri: &Uri) -> bool {
    matches!(uri.scheme_str(), Some("ws") | Some("wss"))
}

/// Every requested sub-protocol, across all header occurrences, in client order.
pub fn requested_subprotocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
