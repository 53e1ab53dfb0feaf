//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use accel_proxy::config::ProxyConfig;
use accel_proxy::lifecycle::Shutdown;
use accel_proxy::{Collaborators, HttpServer, SecretProvider};
use tokio::net::TcpListener;

/// Secret shared by the proxy and the stub control plane.
pub const SECRET: [u8; 32] = *b"0123456789abcdef0123456789abcdef";

pub fn secret() -> Arc<SecretProvider> {
    Arc::new(SecretProvider::from_bytes(&SECRET).unwrap())
}

/// Serve `app` on an ephemeral loopback port.
pub async fn start_control_plane(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config pointing at `control_plane`, quiet and without metrics.
pub fn config_for(control_plane: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.control_plane_url = format!("http://{control_plane}");
    config.upstream.version = "test-version".to_string();
    config.upstream.response_header_timeout_secs = 5;
    config.observability.metrics_enabled = false;
    config
}

/// Running proxy under test.
pub struct TestProxy {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the proxy with the default route table.
pub async fn start_proxy(config: ProxyConfig, collaborators: Collaborators) -> TestProxy {
    let server = HttpServer::new(config, secret(), &collaborators).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signalled = shutdown.signalled();
    tokio::spawn(async move {
        let _ = server.run(listener, signalled).await;
    });

    TestProxy { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
