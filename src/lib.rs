//! Accelerating reverse proxy library.
//!
//! Sits in front of a slow application (the control plane), asks it to
//! authorize expensive operations and then serves them itself.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use handler::{envelope_handler_fn, handler_fn, BoxHandler, Envelope, EnvelopeHandler};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::{Collaborators, Feature};
pub use security::SecretProvider;
