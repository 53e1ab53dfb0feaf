//! `send-url` directive: stream a remote resource to the client.
//!
//! Payload: `{"URL": "http://storage/bucket/object", "AllowRedirects": false}`.
//! The client's `Range` header is forwarded so partial downloads work.
//! Only successful (2xx) answers are relayed; anything else is a 502.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode, Uri};
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use url::Url;

use crate::error::{ProxyError, ProxyResult};
use crate::http::response;
use crate::http::senddata::{Directive, DirectiveContext};
use crate::http::upstream::{classify, HttpClient};
use crate::resilience::timeouts::response_headers_within;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct SendUrlParams {
    #[serde(rename = "URL")]
    pub url: String,

    #[serde(rename = "AllowRedirects", default)]
    pub allow_redirects: bool,
}

/// Streams a remote resource named by the control plane.
#[derive(Debug, Clone)]
pub struct SendUrl {
    client: HttpClient,
    header_timeout: Duration,
}

impl SendUrl {
    pub fn new(client: HttpClient, header_timeout: Duration) -> Self {
        Self {
            client,
            header_timeout,
        }
    }
}

impl Directive for SendUrl {
    type Params = SendUrlParams;

    fn prefix(&self) -> &'static str {
        "send-url"
    }

    fn serve(
        &self,
        ctx: DirectiveContext,
        params: SendUrlParams,
    ) -> BoxFuture<'static, ProxyResult<Response>> {
        let this = self.clone();
        Box::pin(async move { this.fetch(ctx, params).await })
    }
}

impl SendUrl {
    async fn fetch(&self, ctx: DirectiveContext, params: SendUrlParams) -> ProxyResult<Response> {
        let mut target = Url::parse(&params.url)
            .map_err(|e| ProxyError::Protocol(format!("send-url {:?}: {e}", params.url)))?;
        let method = if ctx.method == Method::HEAD {
            Method::HEAD
        } else {
            Method::GET
        };

        let mut redirects = 0;
        loop {
            let uri = Uri::try_from(target.as_str())
                .map_err(|e| ProxyError::InvalidTarget(format!("send-url {target}: {e}")))?;
            let mut request = Request::new(Body::empty());
            *request.method_mut() = method.clone();
            *request.uri_mut() = uri;
            if let Some(range) = ctx.request_headers.get(header::RANGE) {
                request.headers_mut().insert(header::RANGE, range.clone());
            }

            tracing::debug!(url = %target, "send-url");
            let remote = response_headers_within(self.header_timeout, self.client.request(request))
                .await?
                .map_err(classify)?;

            let status = remote.status();
            if status.is_redirection() && params.allow_redirects {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(ProxyError::BadGateway(format!(
                        "send-url: more than {MAX_REDIRECTS} redirects"
                    )));
                }
                let location = remote
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        ProxyError::BadGateway(format!("send-url: {status} without Location"))
                    })?;
                target = target.join(location).map_err(|e| {
                    ProxyError::BadGateway(format!("send-url: bad Location {location:?}: {e}"))
                })?;
                continue;
            }

            if !status.is_success() {
                return Err(ProxyError::BadGateway(format!(
                    "send-url {target}: remote answered {status}"
                )));
            }

            let mut relayed = response::relay(remote);
            relayed.headers_mut().remove(header::SET_COOKIE);
            return Ok(relayed);
        }
    }
}
