//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum app around the route table
//! - Wire up middleware (tracing, request timeout, request ID)
//! - Bind the app to a listener and serve until shutdown
//!
//! # Design Decisions
//! - Axum only supplies the server and middleware; every request goes to a
//!   single fallback that hands it to the proxy's own [`Router`], so the
//!   route table (not Axum) decides 400/403/404/405
//! - Peer addresses are recorded for `X-Forwarded-For`
//! - A client's `X-Request-Id` is only trusted when
//!   `upstream.propagate_correlation_id` is set; otherwise it is dropped
//!   before a fresh one is assigned

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::request::{RequestIdLayer, X_REQUEST_ID};
use crate::routing::table::{self, Collaborators, TableError};
use crate::routing::Router as ProxyRouter;
use crate::security::SecretProvider;

/// HTTP server for the proxy.
pub struct HttpServer {
    app: axum::Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build the default route table and wrap it in a server.
    pub fn new(
        config: ProxyConfig,
        secret: Arc<SecretProvider>,
        collaborators: &Collaborators,
    ) -> Result<Self, TableError> {
        let routes = table::build(&config, secret, collaborators)?;
        Ok(Self::from_router(config, routes))
    }

    /// Serve a custom route table.
    pub fn from_router(config: ProxyConfig, routes: ProxyRouter) -> Self {
        let app = Self::build_app(&config, Arc::new(routes));
        Self { app, config }
    }

    /// Build the Axum app with all middleware layers.
    fn build_app(config: &ProxyConfig, routes: Arc<ProxyRouter>) -> axum::Router {
        let app = axum::Router::new()
            .fallback(move |req: Request<Body>| {
                let routes = Arc::clone(&routes);
                async move { routes.serve(req).await }
            })
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(RequestIdLayer);

        let app = if config.upstream.propagate_correlation_id {
            app
        } else {
            app.layer(middleware::map_request(drop_client_request_id))
        };

        app.layer(TraceLayer::new_for_http())
    }

    /// The app as a `tower::Service`, for in-process use.
    pub fn app(&self) -> axum::Router {
        self.app.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            control_plane = %self.config.upstream.control_plane_url,
            "HTTP server starting"
        );

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn drop_client_request_id(mut req: Request<Body>) -> Request<Body> {
    req.headers_mut().remove(X_REQUEST_ID);
    req
}
