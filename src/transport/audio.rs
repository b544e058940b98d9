//! Per-channel binary audio socket.
//!
//! A client opens one socket per voice channel it fronts. Binary messages
//! are little-endian i16 mono PCM both ways; inbound payloads of any size
//! are rechunked to exact 20 ms frames before they reach the apps. The
//! speaking flag goes out as a small JSON text message.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tracing::warn;

use crate::common::types::ChannelId;
use crate::server::AppState;
use crate::voice::FRAME_SAMPLES;
use crate::voice::ws::{PeerOutbound, bytes_to_samples, frame_to_bytes};

pub async fn audio_handler(
    ws: WebSocketUpgrade,
    Path(channel_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let channel = ChannelId::from(channel_id);
    ws.on_upgrade(move |socket| handle_audio(socket, state, channel))
}

async fn handle_audio(mut socket: WebSocket, state: Arc<AppState>, channel: ChannelId) {
    let (outbound_rx, inbound_tx) = state.voice.register(&channel);
    let mut carry: Vec<i16> = Vec::new();

    loop {
        tokio::select! {
            msg = outbound_rx.recv_async() => {
                // Disconnects when a reconnect replaced this peer.
                let Ok(msg) = msg else { break };
                let message = match msg {
                    PeerOutbound::Frame(frame) => Message::Binary(frame_to_bytes(&frame)),
                    PeerOutbound::Speaking(speaking) => {
                        let json = serde_json::json!({ "op": "speaking", "speaking": speaking });
                        Message::Text(json.to_string().into())
                    }
                };
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(err)) => {
                        warn!("Audio socket error: channel={} err={}", channel, err);
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Binary(data) => {
                        carry.extend(bytes_to_samples(&data));
                        while carry.len() >= FRAME_SAMPLES {
                            let frame: Vec<i16> = carry.drain(..FRAME_SAMPLES).collect();
                            // Dropped when the apps are not draining.
                            let _ = inbound_tx.try_send(frame);
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    state.voice.unregister(&channel, &inbound_tx);
}
