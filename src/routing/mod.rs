//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, headers)
//!     → resolve.rs (middleware, inserts ResolvedTarget)
//!     → router.rs (route lookup in priority order)
//!     → matcher.rs (evaluate match conditions)
//!
//! Route Compilation (startup and every config reload):
//!     RouteConfig[]
//!     → Compile matchers
//!     → Sort by priority
//!     → Swap into the shared ArcSwap
//! ```
//!
//! # Design Decisions
//! - Routes are immutable once compiled; reload replaces the whole table
//! - No regex in hot path (prefix matching only)
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod resolve;
pub mod router;

pub use resolve::{AlreadyRouted, ResolvedTarget, SharedRouter};
pub use router::{ProxyRouter, Route};
