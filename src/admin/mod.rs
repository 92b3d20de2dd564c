//! Administrative API.
//!
//! Served on its own listener so it is never reachable through gateway routes.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get};
use axum::{middleware, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::websocket::SessionRegistry;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<SessionRegistry>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(registry: Arc<SessionRegistry>, api_key: &str, started_at: Instant) -> Self {
        Self {
            registry,
            api_key: Arc::from(api_key),
            started_at,
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/sessions", get(list_sessions))
        .route("/admin/sessions/{id}", delete(close_session))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
