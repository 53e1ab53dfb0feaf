//! Pre-authorization round trips against a stub control plane.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use accel_proxy::http::preauth::RESPONSE_CONTENT_TYPE;
use accel_proxy::security::headers::{API_REQUEST_HEADER, VERSION_HEADER};
use accel_proxy::{envelope_handler_fn, Collaborators, EnvelopeHandler, Feature};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};

mod common;

/// Stub control plane. The path decides the answer; unsigned requests or
/// requests carrying a body are refused.
fn control_plane(calls: Arc<AtomicUsize>) -> axum::Router {
    axum::Router::new().fallback(move |req: Request<Body>| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);

            let signed = req
                .headers()
                .get(API_REQUEST_HEADER)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|token| common::secret().verify_token(token).is_ok());
            if !signed {
                return (StatusCode::UNAUTHORIZED, "unsigned request").into_response();
            }
            if req.headers().get(VERSION_HEADER).map(|v| v.as_bytes()) != Some(&b"test-version"[..]) {
                return (StatusCode::BAD_REQUEST, "missing version").into_response();
            }

            let path = req.uri().path().to_string();
            let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
            if !body.is_empty() {
                return (StatusCode::BAD_REQUEST, "body was forwarded").into_response();
            }

            if path.contains("/deny") {
                (StatusCode::FORBIDDEN, "access denied by policy").into_response()
            } else if path.contains("/html") {
                ([(header::CONTENT_TYPE, "text/html")], "<html/>").into_response()
            } else if path.contains("/bad") {
                ([(header::CONTENT_TYPE, RESPONSE_CONTENT_TYPE)], "{not json").into_response()
            } else {
                (
                    [(header::CONTENT_TYPE, RESPONSE_CONTENT_TYPE)],
                    r#"{"RepoPath":"/repos/p.git"}"#,
                )
                    .into_response()
            }
        }
    })
}

/// Collaborator echoing the envelope field and the request body.
fn collaborator(calls: Arc<AtomicUsize>) -> EnvelopeHandler {
    envelope_handler_fn(move |req: Request<Body>, envelope| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let repo = envelope
                .get("RepoPath")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
            Response::new(Body::from(format!(
                "{repo}|{}",
                String::from_utf8_lossy(&body)
            )))
        }
    })
}

struct Setup {
    proxy: common::TestProxy,
    control_plane_calls: Arc<AtomicUsize>,
    collaborator_calls: Arc<AtomicUsize>,
}

async fn setup() -> Setup {
    let control_plane_calls = Arc::new(AtomicUsize::new(0));
    let collaborator_calls = Arc::new(AtomicUsize::new(0));

    let addr = common::start_control_plane(control_plane(control_plane_calls.clone())).await;
    let collaborators = Collaborators::new()
        .register(Feature::GitInfoRefs, collaborator(collaborator_calls.clone()))
        .register(Feature::ArtifactsUpload, collaborator(collaborator_calls.clone()));
    let proxy = common::start_proxy(common::config_for(addr), collaborators).await;

    Setup {
        proxy,
        control_plane_calls,
        collaborator_calls,
    }
}

#[tokio::test]
async fn trusted_envelope_runs_collaborator_once() {
    let s = setup().await;
    let res = common::client()
        .get(s.proxy.url("/ok/p.git/info/refs?service=git-upload-pack"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/repos/p.git|");
    assert_eq!(s.collaborator_calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.control_plane_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_body_stays_with_the_collaborator() {
    let s = setup().await;
    let res = common::client()
        .post(s.proxy.url("/api/v4/jobs/1/artifacts"))
        .body("artifact bytes")
        .send()
        .await
        .unwrap();

    // The stub refuses any pre-authorization call that carries a body.
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/repos/p.git|artifact bytes");
}

#[tokio::test]
async fn denial_is_relayed_verbatim() {
    let s = setup().await;
    let res = common::client()
        .get(s.proxy.url("/deny/p.git/info/refs"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 403);
    assert_eq!(res.text().await.unwrap(), "access denied by policy");
    assert_eq!(s.collaborator_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn false_positive_is_relayed_verbatim() {
    let s = setup().await;
    let res = common::client()
        .get(s.proxy.url("/html/p.git/info/refs"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "text/html");
    assert_eq!(res.text().await.unwrap(), "<html/>");
    assert_eq!(s.collaborator_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_envelope_is_500() {
    let s = setup().await;
    let res = common::client()
        .get(s.proxy.url("/bad/p.git/info/refs"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body = res.text().await.unwrap();
    assert!(!body.contains("not json"), "envelope leaked: {body}");
    assert_eq!(s.collaborator_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn forged_token_from_client_is_replaced() {
    let s = setup().await;
    let res = common::client()
        .get(s.proxy.url("/ok/p.git/info/refs"))
        .header(API_REQUEST_HEADER, "forged.token.value")
        .header(VERSION_HEADER, "forged")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn unreachable_control_plane_is_502() {
    let addr = common::unused_addr().await;
    let collaborators = Collaborators::new()
        .register(Feature::GitInfoRefs, collaborator(Arc::new(AtomicUsize::new(0))));
    let proxy = common::start_proxy(common::config_for(addr), collaborators).await;

    let res = common::client()
        .get(proxy.url("/ok/p.git/info/refs"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(res.text().await.unwrap(), "Bad Gateway\n");
}

#[tokio::test]
async fn development_mode_shows_error_detail() {
    let addr = common::unused_addr().await;
    let mut config = common::config_for(addr);
    config.upstream.development = true;
    let collaborators = Collaborators::new()
        .register(Feature::GitInfoRefs, collaborator(Arc::new(AtomicUsize::new(0))));
    let proxy = common::start_proxy(config, collaborators).await;

    let res = common::client()
        .get(proxy.url("/ok/p.git/info/refs"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    assert!(res.text().await.unwrap().contains("unreachable"));
}
