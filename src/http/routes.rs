use crate::http::types::{HttpError, HttpResult, HttpSuccess, SetLogLevelRequest};
use crate::http::HttpState;
use crate::line::{dispatch, verify_signature, SIGNATURE_HEADER};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::str::FromStr;
use tracing::log::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// LINE webhook endpoint.
///
/// Only a bad signature is refused (400). Once the body is authentic the answer is
/// always 200, whatever happens afterwards, so LINE never redelivers a batch.
/// Bodies over the route's size limit are refused with 413 before this runs.
pub async fn callback(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if !verify_signature(&body, signature, &state.channel_secret) {
        warn!("Rejecting webhook with missing or invalid signature");
        return HttpError::new(StatusCode::BAD_REQUEST, "Invalid signature").into_response();
    }

    match dispatch(&body) {
        Ok(events) if events.is_empty() => debug!("Webhook has no text messages to answer"),
        Ok(events) => {
            // Detached from the request so a dropped connection can't cancel a reply.
            let relay = state.relay.clone();
            match tokio::spawn(async move { relay.handle_all(events).await }).await {
                Ok(summary) => info!(
                    "Answered {} message(s): {} fallback, {} undelivered",
                    summary.events, summary.fallbacks, summary.undelivered
                ),
                Err(e) => error!("Reply task failed: {e}"),
            }
        }
        Err(e) => warn!("Discarding webhook: {e}"),
    }

    (StatusCode::OK, "OK").into_response()
}

pub async fn sys_version(State(_state): State<HttpState>) -> HttpResult<String> {
    Ok(HttpSuccess(crate::VERSION.to_string()))
}

pub async fn sys_set_log_level(
    State(state): State<HttpState>,
    Json(payload): Json<SetLogLevelRequest>,
) -> HttpResult<bool> {
    let filter = EnvFilter::from_str(&payload.level)
        .map_err(|e| HttpError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    info!("Setting log level to {filter} via API");
    let success = state
        .tracing_reload
        .reload(filter)
        .map(|_| true)
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(HttpSuccess(success))
}
