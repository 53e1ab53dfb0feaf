//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (strip signal headers clients may not set)
//!     → Pass to routing
//!
//! Outgoing pre-authorization:
//!     → secret.rs (shared secret, loaded once)
//!     → token.rs (HS256 token proving the call came from the proxy)
//! ```
//!
//! # Design Decisions
//! - No trust in client input: forgeable headers are dropped before any
//!   handler runs
//! - The secret is an injected provider, not process-global state

pub mod headers;
pub mod secret;
pub mod token;

pub use secret::{SecretError, SecretProvider};
pub use token::{Claims, TokenError};
