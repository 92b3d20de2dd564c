use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::websocket::ProxyError;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub active_sessions: usize,
}

#[derive(Serialize)]
pub struct SessionList {
    pub count: usize,
    pub sessions: Vec<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_sessions: state.registry.len(),
    })
}

pub async fn list_sessions(State(state): State<AdminState>) -> Json<SessionList> {
    let sessions = state.registry.list_active();
    Json(SessionList {
        count: sessions.len(),
        sessions,
    })
}

/// Initiate a normal closure of one session.
pub async fn close_session(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.close_by_id(&id).await {
        Ok(()) => Json(serde_json::json!({ "closed": id })).into_response(),
        Err(e @ ProxyError::SessionNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
