//! Speech processing seams: wake-word scoring, transcription, synthesis
//! and reply generation. The conversation and greeter apps only talk to
//! these traits; the bundled implementation forwards everything to a local
//! worker process over HTTP.

pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::common::{AnyResult, ChannelId};
use crate::configs::SpeechConfig;
use remote::RemoteSpeech;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech worker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("speech worker error: {0}")]
    Worker(String),
    #[error("malformed speech worker response: {0}")]
    Malformed(String),
}

/// Scores fixed-size sample windows for configured wake words.
#[async_trait]
pub trait WakeWordDetector: Send + Sync {
    /// Number of samples per scoring window, at the detector's input rate.
    fn window_size(&self) -> usize;

    /// Returns the index of the detected keyword, if any.
    async fn detect(&self, window: &[i16]) -> Result<Option<usize>, SpeechError>;
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, SpeechError>;
}

/// Produces mono PCM at the voice channel rate.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<i16>, SpeechError>;
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(
        &self,
        text: &str,
        channel: &ChannelId,
        personality: &str,
    ) -> Result<String, SpeechError>;
}

/// The full set of speech seams handed to apps that need them.
pub struct SpeechStack {
    pub wake: Arc<dyn WakeWordDetector>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub reply: Arc<dyn ReplyGenerator>,
}

impl SpeechStack {
    /// Builds a stack where every seam is served by the configured worker.
    pub fn remote(config: &SpeechConfig) -> AnyResult<Self> {
        let worker = Arc::new(RemoteSpeech::new(config)?);
        Ok(Self {
            wake: worker.clone(),
            stt: worker.clone(),
            tts: worker.clone(),
            reply: worker,
        })
    }
}
