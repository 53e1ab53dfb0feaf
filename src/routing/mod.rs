//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → router.rs (reject malformed, clean path, strip URL prefix)
//!     → router.rs (walk the table in order)
//!     → matcher.rs (evaluate extra match conditions)
//!     → matched Route's handler, or 403
//!
//! Table construction (at startup):
//!     ProxyConfig + Collaborators
//!     → table.rs (ordered default routes)
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;
pub mod table;

pub use matcher::{ContentTypeMatcher, Matcher, WebsocketUpgradeMatcher};
pub use router::{clean_path, Route, RouteError, RouteMeta, Router};
pub use table::{Collaborators, Feature};
