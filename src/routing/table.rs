//! The proxy's default route table.
//!
//! # Responsibilities
//! - Assemble the ordered route list from configuration
//! - Wire accelerated features to plugged-in collaborators behind a
//!   pre-authorization call
//! - Queue API traffic, give health endpoints their own error format,
//!   and proxy everything else
//!
//! # Route Order
//! ```text
//! 1. accelerated features (only those with a registered collaborator)
//! 2. /-/health, /-/readiness, /-/liveness
//! 3. /api/            → "api" admission queue → SendData → X-Sendfile → control plane
//! 4. everything else  → SendData → X-Sendfile → control plane
//! ```
//!
//! Feature routes without a collaborator are simply absent, so those
//! requests fall through to the control plane.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ProxyConfig;
use crate::handler::{BoxHandler, EnvelopeHandler};
use crate::http::preauth::PreAuthorizer;
use crate::http::response::ErrorFormat;
use crate::http::senddata::{SendData, SendFile, SendUrl};
use crate::http::upstream::{build_client, Upstream, UpstreamError};
use crate::http::xsendfile;
use crate::resilience::queue::queue_requests;
use crate::routing::matcher::{ContentTypeMatcher, WebsocketUpgradeMatcher};
use crate::routing::router::{Route, RouteError, Router};
use crate::security::SecretProvider;

const GIT_PROJECT: &str = r"^/.+\.git/";
const PROJECT: &str = r"^/([^/]+/){1,}[^/]+/";

/// Accelerated operations a collaborator may take over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// `GET .../info/refs` (git ref advertisement).
    GitInfoRefs,
    /// `POST .../git-upload-pack` (clone / fetch).
    GitUploadPack,
    /// `POST .../git-receive-pack` (push).
    GitReceivePack,
    /// `PUT .../gitlab-lfs/objects/<oid>/<size>`.
    LfsUpload,
    /// `POST /api/v4/jobs/<id>/artifacts`.
    ArtifactsUpload,
    /// Terminal websocket of an environment.
    ChannelWebsocket,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::GitInfoRefs,
        Feature::GitUploadPack,
        Feature::GitReceivePack,
        Feature::LfsUpload,
        Feature::ArtifactsUpload,
        Feature::ChannelWebsocket,
    ];

    /// Identifier used in logs and metrics.
    pub fn id(self) -> &'static str {
        match self {
            Feature::GitInfoRefs => "git_info_refs",
            Feature::GitUploadPack => "git_upload_pack",
            Feature::GitReceivePack => "git_receive_pack",
            Feature::LfsUpload => "lfs_upload",
            Feature::ArtifactsUpload => "artifacts_upload",
            Feature::ChannelWebsocket => "channel_websocket",
        }
    }

    fn route(self, handler: BoxHandler) -> Result<Route, RouteError> {
        let route = match self {
            Feature::GitInfoRefs => {
                Route::new("GET", &format!(r"{GIT_PROJECT}info/refs\z"), handler)?
            }
            Feature::GitUploadPack => {
                Route::new("POST", &format!(r"{GIT_PROJECT}git-upload-pack\z"), handler)?
                    .with_matcher(ContentTypeMatcher::exact(
                        "application/x-git-upload-pack-request",
                    ))
            }
            Feature::GitReceivePack => {
                Route::new("POST", &format!(r"{GIT_PROJECT}git-receive-pack\z"), handler)?
                    .with_matcher(ContentTypeMatcher::exact(
                        "application/x-git-receive-pack-request",
                    ))
            }
            Feature::LfsUpload => Route::new(
                "PUT",
                &format!(r"{GIT_PROJECT}gitlab-lfs/objects/([0-9a-f]{{64}})/([0-9]+)\z"),
                handler,
            )?
            .with_matcher(ContentTypeMatcher::exact("application/octet-stream")),
            Feature::ArtifactsUpload => {
                Route::new("POST", r"^/api/v4/jobs/[0-9]+/artifacts\z", handler)?
            }
            Feature::ChannelWebsocket => Route::new(
                "GET",
                &format!(r"{PROJECT}-/environments/[0-9]+/terminal\.ws\z"),
                handler,
            )?
            .with_matcher(WebsocketUpgradeMatcher)
            .websocket(),
        };
        Ok(route.with_id(self.id()).with_backend("collaborator"))
    }

    /// Suffix appended to the request path for the pre-authorization call.
    fn authorize_suffix(self) -> &'static str {
        match self {
            Feature::GitInfoRefs | Feature::GitUploadPack | Feature::GitReceivePack => "",
            Feature::LfsUpload | Feature::ArtifactsUpload | Feature::ChannelWebsocket => {
                "/authorize"
            }
        }
    }
}

/// Handlers for accelerated features, supplied by the embedding program.
#[derive(Clone, Default)]
pub struct Collaborators {
    handlers: HashMap<Feature, EnvelopeHandler>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler run after `feature` is pre-authorized.
    pub fn register(mut self, feature: Feature, handler: EnvelopeHandler) -> Self {
        self.handlers.insert(feature, handler);
        self
    }

    pub fn get(&self, feature: Feature) -> Option<&EnvelopeHandler> {
        self.handlers.get(&feature)
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut features: Vec<_> = self.handlers.keys().map(|f| f.id()).collect();
        features.sort_unstable();
        f.debug_struct("Collaborators").field("features", &features).finish()
    }
}

/// Errors building the route table.
#[derive(Error, Debug)]
pub enum TableError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Build the default route table.
pub fn build(
    config: &ProxyConfig,
    secret: Arc<SecretProvider>,
    collaborators: &Collaborators,
) -> Result<Router, TableError> {
    let client = build_client();
    let upstream = Upstream::new(&config.upstream, client.clone())?;
    let development = upstream.development();
    let preauth = PreAuthorizer::new(upstream.clone(), secret);

    let send_data = |format: ErrorFormat| {
        SendData::new(xsendfile::intercept(upstream.handler(format), development, format))
            .with(SendFile)
            .with(SendUrl::new(client.clone(), upstream.header_timeout()))
            .development(development)
            .format(format)
            .into_handler()
    };

    let mut router = Router::new(&config.upstream.url_prefix);

    for feature in Feature::ALL {
        if let Some(success) = collaborators.get(feature) {
            let handler = preauth.handler(Arc::clone(success), feature.authorize_suffix());
            router.push(feature.route(handler)?);
        }
    }

    router.push(
        Route::new("", r"^/-/health\z", upstream.handler(ErrorFormat::Plain))?
            .with_id("health")
            .with_backend("control_plane"),
    );
    router.push(
        Route::new("", r"^/-/(readiness|liveness)\z", upstream.handler(ErrorFormat::Json))?
            .with_id("readiness")
            .with_backend("control_plane")
            .with_format(ErrorFormat::Json),
    );

    let queue = &config.api_queue;
    let api = queue_requests(
        "api",
        send_data(ErrorFormat::Plain),
        queue.limit,
        queue.queue_limit,
        queue.timeout(),
    );
    router.push(
        Route::new("", r"^/api/", api)?
            .with_id("api")
            .with_backend("control_plane"),
    );

    router.push(
        Route::new("", "", send_data(ErrorFormat::Plain))?
            .with_id("default")
            .with_backend("control_plane"),
    );

    tracing::info!(
        routes = router.routes().len(),
        collaborators = ?collaborators,
        url_prefix = %router.prefix(),
        "Route table built"
    );
    Ok(router)
}
