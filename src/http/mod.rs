//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeouts)
//!     → routing::resolve (ResolvedTarget, or 404)
//!     → websocket.rs (claims upgrades, hands off to the WebSocket proxy)
//!     → forward.rs (plain HTTP to the resolved target)
//! ```

pub mod forward;
pub mod server;
pub mod websocket;

pub use server::{AppState, HttpServer};
