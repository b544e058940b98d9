//! HTTP client for the local speech worker.
//!
//! Audio travels as raw little-endian 16-bit PCM; everything else is JSON.
//! The worker is expected on localhost, so no retry or backoff here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::common::{AnyResult, ChannelId};
use crate::configs::SpeechConfig;
use crate::speech::{ReplyGenerator, SpeechError, SpeechToText, TextToSpeech, WakeWordDetector};
use crate::voice::ws::{bytes_to_samples, frame_to_bytes};

const WORKER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RemoteSpeech {
    client: reqwest::Client,
    base: String,
    keywords: String,
    window: usize,
}

#[derive(Deserialize)]
struct WakeResponse {
    keyword: Option<usize>,
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

impl RemoteSpeech {
    pub fn new(config: &SpeechConfig) -> AnyResult<Self> {
        let client = reqwest::Client::builder().timeout(WORKER_TIMEOUT).build()?;
        Ok(Self {
            client,
            base: config.worker_url.trim_end_matches('/').to_string(),
            keywords: config.keywords().join(","),
            window: config.wake_window,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_pcm(
        &self,
        path: &str,
        query: &[(&str, &str)],
        samples: &[i16],
    ) -> Result<reqwest::Response, SpeechError> {
        let resp = self
            .client
            .post(self.url(path))
            .query(query)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(frame_to_bytes(samples))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SpeechError::Worker(format!(
                "{} returned {}",
                path,
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl WakeWordDetector for RemoteSpeech {
    fn window_size(&self) -> usize {
        self.window
    }

    async fn detect(&self, window: &[i16]) -> Result<Option<usize>, SpeechError> {
        let resp = self
            .post_pcm("/wake", &[("keywords", &self.keywords)], window)
            .await?;
        let body: WakeResponse = resp.json().await?;
        Ok(body.keyword)
    }
}

#[async_trait]
impl SpeechToText for RemoteSpeech {
    async fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, SpeechError> {
        let rate = sample_rate.to_string();
        let resp = self
            .post_pcm("/transcribe", &[("rate", rate.as_str())], samples)
            .await?;
        let body: TextResponse = resp.json().await?;
        debug!("Transcribed {} samples: {:?}", samples.len(), body.text);
        Ok(body.text)
    }
}

#[async_trait]
impl TextToSpeech for RemoteSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<i16>, SpeechError> {
        let resp = self
            .client
            .post(self.url("/synthesize"))
            .json(&json!({ "text": text, "voice": voice }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SpeechError::Worker(format!(
                "/synthesize returned {}",
                resp.status()
            )));
        }
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(SpeechError::Malformed("empty synthesis payload".into()));
        }
        Ok(bytes_to_samples(&bytes))
    }
}

#[async_trait]
impl ReplyGenerator for RemoteSpeech {
    async fn generate(
        &self,
        text: &str,
        channel: &ChannelId,
        personality: &str,
    ) -> Result<String, SpeechError> {
        let resp = self
            .client
            .post(self.url("/reply"))
            .json(&json!({
                "text": text,
                "channel": channel,
                "personality": personality,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SpeechError::Worker(format!(
                "/reply returned {}",
                resp.status()
            )));
        }
        let body: TextResponse = resp.json().await?;
        Ok(body.text)
    }
}
