//! HTTP control surface.
//!
//! Three things live here: the event WebSocket (JSON ops in, replies
//! out), a one-shot REST mirror of the same dispatch, and the per-channel
//! binary audio socket that backs [`crate::voice::ws`].

pub mod audio;
pub mod events;

use std::sync::Arc;

use axum::{
    Router, middleware,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::apps::EventError;
use crate::server::{AppState, now_ms};

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/events", get(events::websocket_handler))
        .route(
            "/channels/{channel_id}/{app}/{event}",
            post(events::post_event),
        )
        .route("/channels/{channel_id}/audio", get(audio::audio_handler))
        .route("/info", get(events::get_info));

    Router::new()
        .nest(API_V1, v1_routes)
        .route("/version", get(events::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Rejects requests without the configured password. Open instances
/// (no password in the config) skip the check entirely.
async fn check_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(password) = &state.config.server.password else {
        return Ok(next.run(req).await);
    };
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(auth) if auth == password => Ok(next.run(req).await),
        Some(_) => {
            warn!("Authorization failed: invalid password");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("Authorization failed: missing Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// JSON error body for REST responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Bad Request").
    pub error: String,
    pub message: String,
    /// The request path that caused the error.
    pub path: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status: status.as_u16(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message: message.into(),
            path: path.into(),
        }
    }
}

/// Maps dispatch failures onto HTTP statuses: an app nobody registered is
/// a 404, a bad event name a 400, a channel we cannot join a 503 and an
/// app-side failure a 500.
pub fn status_for(err: &EventError) -> StatusCode {
    match err {
        EventError::UnknownApp(_) => StatusCode::NOT_FOUND,
        EventError::UnknownEvent(_) => StatusCode::BAD_REQUEST,
        EventError::Connect(_) => StatusCode::SERVICE_UNAVAILABLE,
        EventError::App(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
