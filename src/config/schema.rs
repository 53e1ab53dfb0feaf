//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Control plane location and proxying behaviour.
    pub upstream: UpstreamConfig,

    /// Shared secret used to sign pre-authorization requests.
    pub secret: SecretConfig,

    /// Admission queue guarding API routes.
    pub api_queue: QueueConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8181").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8181".to_string(),
        }
    }
}

/// Control plane configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the control plane (e.g., "http://localhost:8080").
    pub control_plane_url: String,

    /// Only paths under this prefix are served; everything else is 404.
    pub url_prefix: String,

    /// Version string sent in `X-Proxy-Version`.
    pub version: String,

    /// Deadline for the control plane's response headers, in seconds.
    pub response_header_timeout_secs: u64,

    /// Send detailed error messages to clients.
    pub development: bool,

    /// Keep a client-supplied `X-Request-Id` instead of replacing it.
    pub propagate_correlation_id: bool,
}

impl UpstreamConfig {
    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "http://localhost:8080".to_string(),
            url_prefix: "/".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            response_header_timeout_secs: 300,
            development: false,
            propagate_correlation_id: false,
        }
    }
}

/// Shared secret configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecretConfig {
    /// Path to the base64-encoded secret file.
    pub path: String,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            path: ".accel_proxy_secret".to_string(),
        }
    }
}

/// Admission queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent requests admitted; 0 disables the queue.
    pub limit: usize,

    /// Additional requests allowed to wait for a slot.
    pub queue_limit: usize,

    /// Longest a request may wait for a slot, in milliseconds.
    pub timeout_ms: u64,
}

impl QueueConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            queue_limit: 0,
            timeout_ms: 30_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 600 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9229".to_string(),
        }
    }
}
