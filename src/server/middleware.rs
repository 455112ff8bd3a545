//! axum middleware running both server stages around a handler.
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state, routing::post};
//! use sphinx_hmac::server::{HmacLayerState, hmac_middleware};
//!
//! let state = HmacLayerState::new(server);
//! let app = Router::new()
//!     .route("/orders", post(create_order))
//!     .layer(from_fn_with_state(state, hmac_middleware));
//! ```
//!
//! Handlers read the authenticated identity with `Extension<Identity>`.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::request::Parts;
use tracing::error;

use super::config::RouteIdentity;
use super::server::{HmacServer, Verification};
use crate::core::DEFAULT_BODY_LIMIT;

/// Maps a request to the route identity used for configuration lookup.
pub trait RouteIdentifier: Send + Sync + 'static {
    /// `None` means the request is not routed and HMAC does not apply.
    fn identify(&self, parts: &Parts) -> Option<RouteIdentity>;
}

/// Route identity from axum's matched path.
///
/// The controller is the route template (`/orders/{id}`). The plurality is
/// `entity` when the last segment is a path parameter, `collection`
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchedPathRoutes;

impl RouteIdentifier for MatchedPathRoutes {
    fn identify(&self, parts: &Parts) -> Option<RouteIdentity> {
        let path = parts.extensions.get::<MatchedPath>()?;
        Some(route_for_template(path.as_str(), parts.method.as_str()))
    }
}

fn route_for_template(template: &str, method: &str) -> RouteIdentity {
    let last = template.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let plurality = if last.starts_with('{') && last.ends_with('}') {
        "entity"
    } else {
        "collection"
    };
    RouteIdentity::new(template, plurality, method)
}

/// Shared state for [`hmac_middleware`].
#[derive(Clone)]
pub struct HmacLayerState {
    server: Arc<HmacServer>,
    routes: Arc<dyn RouteIdentifier>,
    body_limit: usize,
}

impl HmacLayerState {
    /// State using [`MatchedPathRoutes`] and the default body limit.
    pub fn new(server: impl Into<Arc<HmacServer>>) -> Self {
        Self {
            server: server.into(),
            routes: Arc::new(MatchedPathRoutes),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Use a custom route identifier.
    pub fn routes(mut self, routes: impl RouteIdentifier) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    /// Maximum body size buffered for signing, in both directions.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// The wrapped server.
    pub fn server(&self) -> &HmacServer {
        &self.server
    }
}

/// Verify the request, run the handler, sign the response.
///
/// Configuration errors become a bare `500` and an `error!` log.
pub async fn hmac_middleware(
    State(state): State<HmacLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let Some(route) = state.routes.identify(&parts) else {
        return next.run(Request::from_parts(parts, body)).await;
    };

    let body = match to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let ctx = match state.server.verify(&route, &parts, &body) {
        Ok(Verification::PassThrough) => {
            return next.run(Request::from_parts(parts, Body::from(body))).await;
        }
        Ok(Verification::Rejected(response)) | Ok(Verification::Interrupted(response)) => {
            return response.map(Body::from).into_response();
        }
        Ok(Verification::Authenticated(ctx)) => ctx,
        Err(err) => {
            error!(controller = %route.controller, error = %err, "hmac configuration error");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    parts.extensions.insert(ctx.identity().clone());
    let response = next.run(Request::from_parts(parts, Body::from(body))).await;

    let (response_parts, response_body) = response.into_parts();
    let bytes = match to_bytes(response_body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, "failed to buffer response for hmac signing");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let mut response = http::Response::from_parts(response_parts, bytes.to_vec());
    if let Err(err) = state.server.sign_response(ctx, &mut response) {
        error!(error = %err, "failed to sign response");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    response.map(Body::from).into_response()
}
