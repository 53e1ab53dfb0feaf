//! `send-file` directive: serve a file from local disk.
//!
//! Payload: `{"Path": "/var/opt/artifacts/archive.zip"}`. The control plane
//! decides which file; the proxy only streams it. Headers the control plane
//! set on its response (content type, disposition, caching) are kept.

use std::io::ErrorKind;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::{ProxyError, ProxyResult};
use crate::http::response;
use crate::http::senddata::{Directive, DirectiveContext};

#[derive(Debug, Clone, Deserialize)]
pub struct SendFileParams {
    #[serde(rename = "Path")]
    pub path: PathBuf,
}

/// Streams a local file named by the control plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendFile;

impl Directive for SendFile {
    type Params = SendFileParams;

    fn prefix(&self) -> &'static str {
        "send-file"
    }

    fn serve(
        &self,
        ctx: DirectiveContext,
        params: SendFileParams,
    ) -> BoxFuture<'static, ProxyResult<Response>> {
        Box::pin(serve_file(ctx, params))
    }
}

pub(crate) async fn serve_file(ctx: DirectiveContext, params: SendFileParams) -> ProxyResult<Response> {
    let file = match tokio::fs::File::open(&params.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %params.path.display(), "send-file: file not found");
            return Ok(response::text(StatusCode::NOT_FOUND, "Not Found"));
        }
        Err(e) => {
            return Err(ProxyError::HandlerFault(format!(
                "send-file {}: {e}",
                params.path.display()
            )))
        }
    };

    let metadata = file
        .metadata()
        .await
        .map_err(|e| ProxyError::HandlerFault(format!("send-file {}: {e}", params.path.display())))?;
    if !metadata.is_file() {
        tracing::warn!(path = %params.path.display(), "send-file: not a regular file");
        return Ok(response::text(StatusCode::NOT_FOUND, "Not Found"));
    }

    tracing::debug!(path = %params.path.display(), size = metadata.len(), "send-file");

    let body = if ctx.method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };

    let mut response = Response::new(body);
    *response.headers_mut() = ctx.response_headers;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }
    Ok(response)
}
