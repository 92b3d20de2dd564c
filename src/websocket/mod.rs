//! WebSocket proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade request (route already resolved)
//!     → upgrade.rs (detect upgrade, correct http→ws / https→wss)
//!     → proxy.rs (session id, header filtering, dial upstream)
//!     → relay.rs (two pumps, close translation via close.rs)
//!     → registry.rs (pair tracked while both legs are open)
//! ```
//!
//! # Design Decisions
//! - WebSocket handled separately from HTTP request/response
//! - Frame-level forwarding (no message buffering beyond the transports)
//! - Close frames propagated in both directions, translated once
//! - Ping/pong forwarded transparently

pub mod close;
pub mod error;
pub mod frame;
pub mod proxy;
pub mod registry;
pub mod relay;
pub mod upgrade;

pub use close::CloseEvent;
pub use error::ProxyError;
pub use proxy::{ProxySession, ProxySettings, WebSocketProxy};
pub use registry::{ConnectionHandle, SessionPair, SessionRegistry, Side};
pub use relay::{ProxyRelay, RelayReport, SessionState};
