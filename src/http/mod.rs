//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (X-Request-Id)
//!     → [routing decides the handler chain]
//!     → preauth.rs (signed call-out to the control plane)
//!     → upstream.rs / collaborator
//!     → senddata/ (directive takes over the response)
//!     → xsendfile.rs (X-Sendfile answers served from disk)
//!     → response.rs (relay, error bodies)
//!     → Send to client
//! ```

pub mod preauth;
pub mod request;
pub mod response;
pub mod senddata;
pub mod server;
pub mod upstream;
pub mod websocket;
pub mod xsendfile;

pub use preauth::PreAuthorizer;
pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::HttpServer;
pub use upstream::Upstream;
