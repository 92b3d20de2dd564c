//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, route targets and value ranges
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Uri;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("route #{index} has an empty name")]
    EmptyRouteName { index: usize },

    #[error("duplicate route name {0:?}")]
    DuplicateRoute(String),

    #[error("route {route:?}: invalid upstream uri {uri:?} ({reason})")]
    InvalidRouteUri { route: String, uri: String, reason: &'static str },

    #[error("route {0:?}: path_prefix must start with '/'")]
    InvalidPathPrefix(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingApiKey,
}

const ROUTE_SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);

    let mut names = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName { index });
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        let invalid = |reason| ValidationError::InvalidRouteUri {
            route: route.name.clone(),
            uri: route.uri.clone(),
            reason,
        };
        match route.uri.parse::<Uri>() {
            Err(_) => errors.push(invalid("unparseable")),
            Ok(uri) => match uri.scheme_str() {
                None => errors.push(invalid("missing scheme")),
                Some(scheme) if !ROUTE_SCHEMES.contains(&scheme) => {
                    errors.push(invalid("unsupported scheme"))
                }
                Some(_) if uri.authority().is_none() => errors.push(invalid("missing host")),
                Some(_) => {}
            },
        }

        if let Some(prefix) = &route.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::InvalidPathPrefix(route.name.clone()));
            }
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.timeouts.close_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.close_secs"));
    }
    if config.websocket.max_message_size == 0 {
        errors.push(ValidationError::Zero("websocket.max_message_size"));
    }

    if config.admin.enabled {
        check_address("admin.bind_address", &config.admin.bind_address, &mut errors);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
    }
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
