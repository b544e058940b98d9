//! Voice channels backed by WebSocket audio peers.
//!
//! The transport layer registers one peer per channel id when a client
//! opens the audio socket. Joining a channel hands out a handle wired to
//! that peer's frame channels; if the socket later drops, sends fail and
//! the apps wind down on their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, info};

use super::{VoiceBackend, VoiceChannel, VoiceError};
use crate::common::types::ChannelId;

/// Messages flowing from a channel handle to the peer socket.
pub enum PeerOutbound {
    Frame(Vec<i16>),
    Speaking(bool),
}

struct Peer {
    outbound_tx: flume::Sender<PeerOutbound>,
    inbound_tx: flume::Sender<Vec<i16>>,
    inbound_rx: flume::Receiver<Vec<i16>>,
}

pub struct WsVoiceBackend {
    peers: DashMap<ChannelId, Peer>,
}

impl WsVoiceBackend {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Wires up a freshly accepted audio socket. Returns the halves the
    /// socket loop drives: outbound messages to forward to the client, and
    /// the sender for inbound frames. A reconnect replaces the old peer.
    pub fn register(
        &self,
        channel: &ChannelId,
    ) -> (flume::Receiver<PeerOutbound>, flume::Sender<Vec<i16>>) {
        let (outbound_tx, outbound_rx) = flume::bounded(16);
        let (inbound_tx, inbound_rx) = flume::bounded(64);

        self.peers.insert(
            channel.clone(),
            Peer {
                outbound_tx,
                inbound_tx: inbound_tx.clone(),
                inbound_rx,
            },
        );
        info!("Voice peer registered: channel={}", channel);
        (outbound_rx, inbound_tx)
    }

    /// Removes the peer, but only for the socket that registered it. A
    /// reconnect replaces the entry, and the old socket's teardown must
    /// not take the replacement with it.
    pub fn unregister(&self, channel: &ChannelId, inbound: &flume::Sender<Vec<i16>>) {
        let removed = self
            .peers
            .remove_if(channel, |_, peer| peer.inbound_tx.same_channel(inbound));
        if removed.is_some() {
            info!("Voice peer unregistered: channel={}", channel);
        }
    }

    pub fn is_connected(&self, channel: &ChannelId) -> bool {
        self.peers.contains_key(channel)
    }
}

impl Default for WsVoiceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceBackend for WsVoiceBackend {
    async fn join(&self, channel: &ChannelId) -> Result<Arc<dyn VoiceChannel>, VoiceError> {
        let peer = self
            .peers
            .get(channel)
            .ok_or_else(|| VoiceError::NotConnected(channel.clone()))?;

        Ok(Arc::new(WsVoiceChannel {
            id: channel.clone(),
            outbound: peer.outbound_tx.clone(),
            inbound: peer.inbound_rx.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct WsVoiceChannel {
    id: ChannelId,
    outbound: flume::Sender<PeerOutbound>,
    inbound: flume::Receiver<Vec<i16>>,
    closed: AtomicBool,
}

#[async_trait]
impl VoiceChannel for WsVoiceChannel {
    fn channel_id(&self) -> &ChannelId {
        &self.id
    }

    async fn send_frame(&self, frame: &[i16]) -> Result<(), VoiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VoiceError::Closed);
        }
        self.outbound
            .send_async(PeerOutbound::Frame(frame.to_vec()))
            .await
            .map_err(|_| VoiceError::Closed)
    }

    async fn recv_frame(&self) -> Result<Vec<i16>, VoiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VoiceError::Closed);
        }
        self.inbound
            .recv_async()
            .await
            .map_err(|_| VoiceError::Closed)
    }

    fn set_speaking(&self, speaking: bool) {
        // Dropped rather than awaited when the socket is backed up
        let _ = self.outbound.try_send(PeerOutbound::Speaking(speaking));
    }

    async fn disconnect(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("Voice channel handle closed: channel={}", self.id);
    }
}

/// Encodes a PCM frame as little-endian bytes for the wire.
pub fn frame_to_bytes(frame: &[i16]) -> Bytes {
    let mut buf = Vec::with_capacity(frame.len() * 2);
    for sample in frame {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(buf)
}

/// Decodes little-endian bytes back into PCM samples. A trailing odd byte
/// is discarded.
pub fn bytes_to_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
