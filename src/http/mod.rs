mod routes;
mod types;

use crate::config::HTTPConfig;
use crate::http::routes::*;
use crate::http::types::HttpError;
use crate::relay::Relay;
use crate::TracingReloadHandle;
use anyhow::{bail, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::routing::{get, post};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::log::debug;

#[cfg(feature = "sentry")]
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};

/// Largest webhook body accepted, larger ones get 413 before any signature check.
pub const CALLBACK_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub relay: Relay,
    pub channel_secret: Arc<str>,
    pub tracing_reload: TracingReloadHandle,
}

async fn auth_middleware(
    axum::extract::State(expected_token): axum::extract::State<Arc<str>>,
    headers: axum::http::HeaderMap,
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, HttpError> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| HttpError::new(StatusCode::UNAUTHORIZED, "Missing authorization header"))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| HttpError::new(StatusCode::BAD_REQUEST, "Invalid authorization header"))?;

    let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
    if !bool::from(token.as_bytes().ct_eq(expected_token.as_bytes())) {
        return Err(HttpError::new(StatusCode::UNAUTHORIZED, "Invalid token"));
    }

    Ok(next.run(request).await)
}

/// Builds the router. `admin_token` is required when the `/sys/*` routes are enabled.
pub fn create_app(
    config: &HTTPConfig,
    state: HttpState,
    admin_token: Option<String>,
    _sentry: bool,
) -> Result<axum::Router> {
    let mut router = axum::Router::new().route(
        "/callback",
        post(callback).layer(DefaultBodyLimit::max(CALLBACK_BODY_LIMIT)),
    );

    if config.admin_enabled {
        let Some(token) = admin_token.filter(|t| !t.trim().is_empty()) else {
            bail!("Missing required RELAY_HTTP_AUTH_TOKEN environment variable, and admin_enabled is set!");
        };

        debug!("Adding authenticated admin routes!");
        let admin = axum::Router::new()
            .route("/sys/version", get(sys_version))
            .route("/sys/set-log-level", post(sys_set_log_level))
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::<str>::from(token),
                auth_middleware,
            ));
        router = router.merge(admin);
    }

    router = router.layer(ServiceBuilder::new().layer(SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-version"),
        HeaderValue::from_static(crate::VERSION),
    )));

    // If Sentry is enabled, include axum integration layers.
    #[cfg(feature = "sentry")]
    if _sentry {
        debug!("Adding Sentry HTTP layer!");
        router = router
            .layer(
                ServiceBuilder::new()
                    .layer(NewSentryLayer::<axum::http::Request<axum::body::Body>>::new_from_top()),
            )
            .layer(ServiceBuilder::new().layer(SentryHttpLayer::new().enable_transaction()))
    }

    Ok(router.with_state(state))
}
