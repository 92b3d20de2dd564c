//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request
//! - Resolve the upstream target URI for a matched route
//!
//! # Design Decisions
//! - Immutable after construction; reloads build a new router and swap it in
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit `None` rather than a silent default route

use axum::http::uri::{PathAndQuery, Uri};
use axum::http::HeaderMap;

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    /// Upstream base: only scheme and authority are used.
    pub uri: Uri,
    pub preserve_host: bool,
    pub priority: u32,
    matcher: AndMatcher,
}

impl Route {
    /// Compile a route. Returns `None` when the target URI lacks a scheme or authority.
    pub fn from_config(config: &RouteConfig) -> Option<Self> {
        let uri: Uri = config.uri.parse().ok()?;
        uri.scheme()?;
        uri.authority()?;

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        Some(Self {
            name: config.name.clone(),
            uri,
            preserve_host: config.preserve_host,
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
        })
    }

    pub fn matches(&self, uri: &Uri, headers: &HeaderMap) -> bool {
        self.matcher.matches(uri, headers)
    }

    /// Route scheme and authority combined with the request's path and query.
    pub fn resolve(&self, request_uri: &Uri) -> Uri {
        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = Some(
            request_uri
                .path_and_query()
                .cloned()
                .unwrap_or_else(|| PathAndQuery::from_static("/")),
        );
        Uri::from_parts(parts).unwrap_or_else(|_| self.uri.clone())
    }
}

/// Priority-ordered route table.
#[derive(Debug, Default)]
pub struct ProxyRouter {
    routes: Vec<Route>,
}

impl ProxyRouter {
    /// Compile routes; higher priority first, config order breaks ties.
    pub fn from_config(configs: Vec<RouteConfig>) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .filter_map(|config| {
                let route = Route::from_config(config);
                if route.is_none() {
                    tracing::warn!(route = %config.name, uri = %config.uri, "Skipping route with invalid target URI");
                }
                route
            })
            .collect();
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        tracing::debug!(routes = routes.len(), "Route table compiled");
        Self { routes }
    }

    /// First matching route in priority order.
    pub fn match_request(&self, uri: &Uri, headers: &HeaderMap) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(uri, headers))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
