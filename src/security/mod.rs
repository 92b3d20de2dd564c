//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved request:
//!     → headers.rs (Host, hop-by-hop, Sec-WebSocket-*, X-Forwarded-*)
//!     → Forward upstream (HTTP or WebSocket handshake)
//! ```
//!
//! # Design Decisions
//! - No trust in client input: connection-scoped headers never cross the proxy
//! - WebSocket and HTTP forwarding use separate chains

pub mod headers;

pub use headers::{HeaderFilter, HeaderFilterChain, RequestContext};
