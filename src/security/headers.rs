//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Replace or preserve the `Host` header
//! - Strip `Sec-WebSocket-*` before dialing upstream (the handshake re-adds its own)
//! - Strip hop-by-hop headers
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//!
//! # Design Decisions
//! - Filters are pure `HeaderMap -> HeaderMap` steps run in chain order
//! - The original client host travels in `RequestContext`, not in the map being filtered
//! - Existing X-Forwarded-For values are extended, never replaced

use std::net::SocketAddr;

use axum::http::header::{HeaderName, CONNECTION, HOST};
use axum::http::{HeaderMap, HeaderValue};

/// Request facts the filters may consult.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// `Host` as the client sent it.
    pub original_host: Option<HeaderValue>,
    /// Keep the client-facing host when forwarding.
    pub preserve_host: bool,
    /// Peer address of the client connection, when known.
    pub client_addr: Option<SocketAddr>,
    /// Scheme the client used to reach the gateway.
    pub scheme: &'static str,
}

impl RequestContext {
    pub fn new(headers: &HeaderMap, preserve_host: bool, client_addr: Option<SocketAddr>) -> Self {
        Self {
            original_host: headers.get(HOST).cloned(),
            preserve_host,
            client_addr,
            scheme: "http",
        }
    }
}

/// One step of the header chain.
pub trait HeaderFilter: Send + Sync + std::fmt::Debug {
    fn filter(&self, headers: HeaderMap, ctx: &RequestContext) -> HeaderMap;
}

/// Drops `Host`; puts the original back when the route preserves it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostHeaderFilter;

impl HeaderFilter for HostHeaderFilter {
    fn filter(&self, mut headers: HeaderMap, ctx: &RequestContext) -> HeaderMap {
        headers.remove(HOST);
        if ctx.preserve_host {
            if let Some(host) = &ctx.original_host {
                headers.insert(HOST, host.clone());
            }
        }
        headers
    }
}

/// Drops every header whose name starts with `sec-websocket`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketHeaderFilter;

impl HeaderFilter for WebSocketHeaderFilter {
    fn filter(&self, headers: HeaderMap, _ctx: &RequestContext) -> HeaderMap {
        let mut filtered = HeaderMap::with_capacity(headers.len());
        let mut current: Option<HeaderName> = None;
        // Iterating an owned map yields `None` names for repeated values.
        for (name, value) in headers {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                if !name.as_str().starts_with("sec-websocket") {
                    filtered.append(name.clone(), value);
                }
            }
        }
        filtered
    }
}

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Drops hop-by-hop headers, including any listed in `Connection`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HopByHopHeaderFilter;

impl HeaderFilter for HopByHopHeaderFilter {
    fn filter(&self, mut headers: HeaderMap, _ctx: &RequestContext) -> HeaderMap {
        let named: Vec<String> = headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|token| token.trim().to_ascii_lowercase())
            .filter(|token| !token.is_empty())
            .collect();

        for name in HOP_BY_HOP.iter().copied().chain(named.iter().map(String::as_str)) {
            headers.remove(name);
        }
        headers
    }
}

/// Records the client hop in `X-Forwarded-*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedHeadersFilter;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

impl HeaderFilter for ForwardedHeadersFilter {
    fn filter(&self, mut headers: HeaderMap, ctx: &RequestContext) -> HeaderMap {
        if let Some(addr) = ctx.client_addr {
            let ip = addr.ip().to_string();
            let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) if !existing.is_empty() => format!("{existing}, {ip}"),
                _ => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(ctx.scheme));
        if let Some(host) = &ctx.original_host {
            headers.insert(X_FORWARDED_HOST, host.clone());
        }
        headers
    }
}

/// Ordered list of header filters.
#[derive(Debug, Default)]
pub struct HeaderFilterChain {
    filters: Vec<Box<dyn HeaderFilter>>,
}

impl HeaderFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to the end of the chain.
    pub fn with(mut self, filter: impl HeaderFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Chain used for upstream WebSocket handshakes.
    pub fn websocket_default() -> Self {
        Self::new()
            .with(ForwardedHeadersFilter)
            .with(HopByHopHeaderFilter)
            .with(HostHeaderFilter)
            .with(WebSocketHeaderFilter)
    }

    /// Chain used for plain HTTP forwarding.
    pub fn http_default() -> Self {
        Self::new()
            .with(ForwardedHeadersFilter)
            .with(HopByHopHeaderFilter)
            .with(HostHeaderFilter)
    }

    pub fn apply(&self, headers: &HeaderMap, ctx: &RequestContext) -> HeaderMap {
        self.filters
            .iter()
            .fold(headers.clone(), |headers, filter| filter.filter(headers, ctx))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("gateway.example.com"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert("sec-websocket-key", HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        headers.insert("sec-websocket-version", HeaderValue::from_static("13"));
        headers.insert("sec-websocket-protocol", HeaderValue::from_static("chat"));
        headers.append("cookie", HeaderValue::from_static("a=1"));
        headers.append("cookie", HeaderValue::from_static("b=2"));
        headers
    }

    #[test]
    fn test_host_removed_unless_preserved() {
        let headers = handshake_headers();

        let ctx = RequestContext::new(&headers, false, None);
        let filtered = HostHeaderFilter.filter(headers.clone(), &ctx);
        assert!(filtered.get(HOST).is_none());

        let ctx = RequestContext::new(&headers, true, None);
        let filtered = HostHeaderFilter.filter(headers, &ctx);
        assert_eq!(filtered.get(HOST).unwrap(), "gateway.example.com");
    }

    #[test]
    fn test_sec_websocket_headers_stripped() {
        let headers = handshake_headers();
        let ctx = RequestContext::new(&headers, false, None);
        let filtered = WebSocketHeaderFilter.filter(headers, &ctx);

        assert!(filtered.keys().all(|name| !name.as_str().starts_with("sec-websocket")));
        assert_eq!(filtered.get_all("cookie").iter().count(), 2);
        assert_eq!(filtered.get("upgrade").unwrap(), "websocket");
    }

    #[test]
    fn test_hop_by_hop_and_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, X-Session-Hint"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hint", HeaderValue::from_static("sticky"));
        headers.insert("x-tenant", HeaderValue::from_static("acme"));

        let filtered = HopByHopHeaderFilter.filter(headers, &RequestContext::default());
        assert!(filtered.get(CONNECTION).is_none());
        assert!(filtered.get("keep-alive").is_none());
        assert!(filtered.get("x-session-hint").is_none());
        assert_eq!(filtered.get("x-tenant").unwrap(), "acme");
    }

    #[test]
    fn test_forwarded_for_is_extended() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("gateway.example.com"));
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        let ctx = RequestContext::new(&headers, false, Some("192.168.1.7:50000".parse().unwrap()));

        let filtered = ForwardedHeadersFilter.filter(headers, &ctx);
        assert_eq!(filtered.get(X_FORWARDED_FOR).unwrap(), "10.0.0.1, 192.168.1.7");
        assert_eq!(filtered.get(X_FORWARDED_PROTO).unwrap(), "http");
        assert_eq!(filtered.get(X_FORWARDED_HOST).unwrap(), "gateway.example.com");
    }

    #[test]
    fn test_websocket_chain() {
        let headers = handshake_headers();
        let ctx = RequestContext::new(&headers, false, None);
        let chain = HeaderFilterChain::websocket_default();
        assert_eq!(chain.len(), 4);

        let filtered = chain.apply(&headers, &ctx);
        assert!(filtered.get(HOST).is_none());
        assert!(filtered.get("upgrade").is_none());
        assert!(filtered.get("sec-websocket-key").is_none());
        assert!(filtered.get("sec-websocket-protocol").is_none());
        assert_eq!(filtered.get_all("cookie").iter().count(), 2);
        // The input map is untouched.
        assert!(headers.get("sec-websocket-key").is_some());
    }
}
