//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → stop accepting → close WebSocket sessions (1001) → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, then close sessions
//! - Sessions get a going-away close instead of a dropped socket

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
