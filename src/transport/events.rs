//! Event dispatch over WebSocket and REST.
//!
//! Both surfaces feed [`SessionRegistry::send_event`]. The WebSocket keeps
//! a reply pump per op so late notices (like "Playing track [ ... ]")
//! still reach the client; the REST mirror only returns the replies
//! produced while the event was handled.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::apps::{AppEvent, AppKind, ReplySink};
use crate::common::types::ChannelId;
use crate::server::AppState;
use crate::session::SessionRegistry;
use crate::transport::{ApiError, status_for};

#[derive(Debug, Deserialize)]
#[serde(tag = "op")]
#[serde(rename_all = "camelCase")]
pub enum IncomingOp {
    #[serde(rename_all = "camelCase")]
    Event {
        channel_id: String,
        app: String,
        event: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "op")]
#[serde(rename_all = "camelCase")]
pub enum OutgoingOp {
    Ready,
    #[serde(rename_all = "camelCase")]
    Reply {
        channel_id: String,
        app: String,
        text: String,
    },
    Error {
        message: String,
    },
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (out_tx, out_rx) = flume::unbounded::<OutgoingOp>();
    info!("Event socket connected");
    let _ = out_tx.send(OutgoingOp::Ready);

    loop {
        tokio::select! {
            Ok(msg) = out_rx.recv_async() => {
                let Ok(json) = serde_json::to_string(&msg) else { continue };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(err)) => {
                        warn!("Event socket error: {}", err);
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(text) => handle_op(&state.registry, &out_tx, &text).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    info!("Event socket closed");
}

async fn handle_op(
    registry: &Arc<SessionRegistry>,
    out_tx: &flume::Sender<OutgoingOp>,
    text: &str,
) {
    let op: IncomingOp = match serde_json::from_str(text) {
        Ok(op) => op,
        Err(err) => {
            let _ = out_tx.send(OutgoingOp::Error {
                message: format!("malformed op: {}", err),
            });
            return;
        }
    };
    let IncomingOp::Event {
        channel_id,
        app,
        event,
        args,
    } = op;
    let Some(kind) = AppKind::parse(&app) else {
        let _ = out_tx.send(OutgoingOp::Error {
            message: format!("unknown app: {}", app),
        });
        return;
    };

    // Replies flow through this pump for as long as the app keeps the
    // sink; a later "Playing track [ ... ]" notice still lands on the
    // socket.
    let (reply_tx, reply_rx) = flume::unbounded::<String>();
    {
        let out_tx = out_tx.clone();
        let channel_id = channel_id.clone();
        tokio::spawn(async move {
            while let Ok(text) = reply_rx.recv_async().await {
                let sent = out_tx.send(OutgoingOp::Reply {
                    channel_id: channel_id.clone(),
                    app: app.clone(),
                    text,
                });
                if sent.is_err() {
                    break;
                }
            }
        });
    }

    let channel = ChannelId::from(channel_id);
    let event = AppEvent::new(event, args, ReplySink::new(reply_tx));
    if let Err(err) = registry.send_event(&channel, kind, event).await {
        let _ = out_tx.send(OutgoingOp::Error {
            message: err.to_string(),
        });
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct EventBody {
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EventOutcome {
    pub ok: bool,
    pub replies: Vec<String>,
}

/// POST /v1/channels/{channel_id}/{app}/{event}
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    Path((channel_id, app, event)): Path<(String, String, String)>,
    Json(body): Json<EventBody>,
) -> Result<Json<EventOutcome>, (StatusCode, Json<ApiError>)> {
    let path = format!("/v1/channels/{}/{}/{}", channel_id, app, event);
    debug!("POST {}", path);

    let kind = AppKind::parse(&app).ok_or_else(|| {
        let status = StatusCode::NOT_FOUND;
        (
            status,
            Json(ApiError::new(status, format!("unknown app: {}", app), &path)),
        )
    })?;

    let (reply_tx, reply_rx) = flume::unbounded::<String>();
    let channel = ChannelId::from(channel_id);
    let event = AppEvent::new(event, body.args, ReplySink::new(reply_tx));
    state
        .registry
        .send_event(&channel, kind, event)
        .await
        .map_err(|err| {
            let status = status_for(&err);
            (status, Json(ApiError::new(status, err.to_string(), &path)))
        })?;

    let replies: Vec<String> = reply_rx.drain().collect();
    Ok(Json(EventOutcome { ok: true, replies }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub version: String,
    /// Unix millis the binary was built at.
    pub build_time: u64,
    pub git_branch: String,
    pub git_commit: String,
    pub sources: Vec<String>,
    pub apps: Vec<String>,
    pub sessions: usize,
}

/// GET /v1/info
pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<Info> {
    debug!("GET /v1/info");
    Json(Info {
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_time: option_env!("BUILD_TIME")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        git_branch: option_env!("GIT_BRANCH").unwrap_or("unknown").to_string(),
        git_commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
        sources: state
            .sources
            .source_names()
            .into_iter()
            .map(String::from)
            .collect(),
        apps: state
            .apps
            .kinds()
            .into_iter()
            .map(|kind| kind.to_string())
            .collect(),
        sessions: state.registry.session_count(),
    })
}

/// GET /version
pub async fn get_version() -> String {
    debug!("GET /version");
    env!("CARGO_PKG_VERSION").to_string()
}
