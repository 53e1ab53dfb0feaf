//! Proxying to the control plane.
//!
//! # Responsibilities
//! - Build outbound requests aimed at the control plane
//! - Send them with a deadline on the response headers
//! - Stream the control plane's answer back to the client
//! - Refuse to relay a pre-authorization envelope to a client
//!
//! # Design Decisions
//! - One shared connection-pooling client for every outbound call
//! - Bodies are streamed both ways, never buffered
//! - Dial failures and header timeouts are 502; a request body that fails
//!   mid-upload is a client abort; any other hyper usage error is a 500

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::InvalidHeaderValue;
use axum::http::request::Parts;
use axum::http::{header, HeaderName, HeaderValue, Request, Uri};
use axum::response::Response;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::handler::{handler_fn, BoxHandler};
use crate::http::preauth::is_trusted_response;
use crate::http::response::{self, ErrorFormat};
use crate::resilience::timeouts::response_headers_within;
use crate::security::headers::{strip_hop_by_hop, VERSION_HEADER};

/// Client used for every outbound HTTP call.
pub type HttpClient = Client<HttpConnector, Body>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Build the shared outbound client.
pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Errors building an [`Upstream`] from configuration.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("invalid control plane URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid version string: {0}")]
    Version(#[from] InvalidHeaderValue),
}

/// The control plane, as seen from the proxy.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: HttpClient,
    base: Url,
    version: HeaderValue,
    header_timeout: Duration,
    development: bool,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig, client: HttpClient) -> Result<Self, UpstreamError> {
        Ok(Self {
            client,
            base: Url::parse(&config.control_plane_url)?,
            version: HeaderValue::from_str(&config.version)?,
            header_timeout: config.response_header_timeout(),
            development: config.development,
        })
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn header_timeout(&self) -> Duration {
        self.header_timeout
    }

    /// Whether error details are shown to clients.
    pub fn development(&self) -> bool {
        self.development
    }

    /// `base + path + suffix`, joined with exactly one slash, plus `query`.
    pub fn target_uri(&self, path: &str, suffix: &str, query: Option<&str>) -> ProxyResult<Uri> {
        let origin = &self.base[..url::Position::BeforePath];
        let mut target = format!(
            "{origin}{}{suffix}",
            single_joining_slash(self.base.path(), path)
        );
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }
        Uri::try_from(target.as_str())
            .map_err(|e| ProxyError::InvalidTarget(format!("{target}: {e}")))
    }

    /// Outbound request mirroring the inbound head.
    ///
    /// Hop-by-hop headers and `Host` are dropped, `X-Forwarded-For` gains the
    /// peer address and the proxy version is attached.
    pub fn outbound(&self, parts: &Parts, suffix: &str, body: Body) -> ProxyResult<Request<Body>> {
        let uri = self.target_uri(parts.uri.path(), suffix, parts.uri.query())?;

        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {}", peer.ip()),
                None => peer.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        headers.insert(VERSION_HEADER, self.version.clone());

        let mut request = Request::new(body);
        *request.method_mut() = parts.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// Send a request, waiting at most the header timeout for the response head.
    pub async fn send(&self, request: Request<Body>) -> ProxyResult<hyper::Response<Incoming>> {
        let target = request.uri().clone();
        tracing::debug!(method = %request.method(), uri = %target, "Calling control plane");

        response_headers_within(self.header_timeout, self.client.request(request))
            .await?
            .map_err(|e| {
                let err = classify(e);
                tracing::debug!(uri = %target, error = %err, "Control plane call failed");
                err
            })
    }

    /// Proxy a request to the control plane and relay the answer.
    pub async fn proxy(&self, req: Request<Body>) -> ProxyResult<Response> {
        let (parts, body) = req.into_parts();
        let outbound = self.outbound(&parts, "", body)?;
        let upstream_response = self.send(outbound).await?;

        if is_trusted_response(upstream_response.headers()) {
            return Err(ProxyError::Protocol(format!(
                "pre-authorization response on proxied request {} {}",
                parts.method,
                parts.uri.path()
            )));
        }
        Ok(response::relay(upstream_response))
    }

    /// Handler proxying every request, rendering errors in `format`.
    pub fn handler(&self, format: ErrorFormat) -> BoxHandler {
        let upstream = Arc::new(self.clone());
        handler_fn(move |req| {
            let upstream = Arc::clone(&upstream);
            async move {
                match upstream.proxy(req).await {
                    Ok(response) => response,
                    Err(e) => e.into_response_for(upstream.development, format),
                }
            }
        })
    }
}

/// Map a client error onto the proxy's error kinds.
///
/// Only a failure while reading the inbound request body counts as a
/// client abort. Other misuse reported by hyper is a handler fault.
pub(crate) fn classify(err: hyper_util::client::legacy::Error) -> ProxyError {
    if err.is_connect() {
        return ProxyError::BadGateway(error_chain(&err));
    }

    let user_error = std::iter::successors(err.source(), |&cause| cause.source())
        .filter_map(|cause| cause.downcast_ref::<hyper::Error>())
        .find(|hyper_err| hyper_err.is_user());
    match user_error {
        Some(hyper_err) if from_inbound_body(hyper_err) => ProxyError::ClientAborted,
        Some(_) => ProxyError::HandlerFault(error_chain(&err)),
        None => ProxyError::BadGateway(error_chain(&err)),
    }
}

fn from_inbound_body(err: &hyper::Error) -> bool {
    std::iter::successors(err.source(), |&cause| cause.source())
        .any(|cause| cause.is::<axum::Error>())
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}
