use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::common::types::ChannelId;

pub mod ws;

pub use ws::{WsVoiceBackend, WsVoiceChannel};

/// Output sample rate for all voice audio.
pub const SAMPLE_RATE: u32 = 48_000;
/// Samples per 20 ms mono frame at [`SAMPLE_RATE`].
pub const FRAME_SAMPLES: usize = 960;
/// Wall-clock duration of one frame.
pub const FRAME_MILLIS: u64 = 20;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("no voice peer connected for channel {0}")]
    NotConnected(ChannelId),
    #[error("voice channel closed")]
    Closed,
}

/// A live connection to one voice channel. Frames are 20 ms of mono PCM at
/// 48 kHz in both directions.
#[async_trait]
pub trait VoiceChannel: Send + Sync {
    fn channel_id(&self) -> &ChannelId;

    /// Sends one outbound frame. Callers pace themselves at frame rate.
    async fn send_frame(&self, frame: &[i16]) -> Result<(), VoiceError>;

    /// Waits for the next inbound frame.
    async fn recv_frame(&self) -> Result<Vec<i16>, VoiceError>;

    /// Best-effort speaking indicator, flipped around guard ownership.
    fn set_speaking(&self, speaking: bool);

    async fn disconnect(&self);
}

/// Joins voice channels. One implementation exists per deployment; tests
/// substitute their own.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn join(&self, channel: &ChannelId) -> Result<Arc<dyn VoiceChannel>, VoiceError>;
}
