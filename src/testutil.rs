//! Shared fakes for unit tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::apps::{AppDeps, AppError, AppEvent, AppKind, VoiceApp};
use crate::common::{AnyResult, ChannelId};
use crate::configs::Config;
use crate::session::Container;
use crate::sources::{
    AudioSource, MediaError, Resolution, ResolveError, SourceSet, TrackInfo, TrackPayload,
};
use crate::speech::{
    ReplyGenerator, SpeechError, SpeechStack, SpeechToText, TextToSpeech, WakeWordDetector,
};
use crate::voice::{VoiceBackend, VoiceChannel, VoiceError};

/// In-memory voice channel that records outbound frames and lets the test
/// feed inbound ones.
pub struct FakeVoiceChannel {
    id: ChannelId,
    speaking: AtomicBool,
    disconnected: AtomicBool,
    sent: parking_lot::Mutex<Vec<Vec<i16>>>,
    inbound_tx: parking_lot::Mutex<Option<flume::Sender<Vec<i16>>>>,
    inbound_rx: flume::Receiver<Vec<i16>>,
}

impl FakeVoiceChannel {
    pub fn shared(id: &str) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = flume::unbounded();
        Arc::new(Self {
            id: ChannelId::from(id),
            speaking: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            sent: parking_lot::Mutex::new(Vec::new()),
            inbound_tx: parking_lot::Mutex::new(Some(inbound_tx)),
            inbound_rx,
        })
    }

    pub fn push_frame(&self, frame: Vec<i16>) {
        if let Some(tx) = &*self.inbound_tx.lock() {
            let _ = tx.send(frame);
        }
    }

    /// Closes the inbound side so `recv_frame` reports the channel closed.
    pub fn end_input(&self) {
        self.inbound_tx.lock().take();
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_frames(&self) -> Vec<Vec<i16>> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl VoiceChannel for FakeVoiceChannel {
    fn channel_id(&self) -> &ChannelId {
        &self.id
    }

    async fn send_frame(&self, frame: &[i16]) -> Result<(), VoiceError> {
        if self.is_disconnected() {
            return Err(VoiceError::Closed);
        }
        self.sent.lock().push(frame.to_vec());
        Ok(())
    }

    async fn recv_frame(&self) -> Result<Vec<i16>, VoiceError> {
        self.inbound_rx
            .recv_async()
            .await
            .map_err(|_| VoiceError::Closed)
    }

    fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::SeqCst);
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.end_input();
    }
}

/// Backend that mints [`FakeVoiceChannel`]s and counts joins.
pub struct FakeBackend {
    channels: DashMap<ChannelId, Arc<FakeVoiceChannel>>,
    fail: AtomicBool,
    joins: AtomicUsize,
}

impl FakeBackend {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
            fail: AtomicBool::new(false),
            joins: AtomicUsize::new(0),
        })
    }

    pub fn fail_joins(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn join_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn channel(&self, id: &ChannelId) -> Option<Arc<FakeVoiceChannel>> {
        self.channels.get(id).map(|c| c.clone())
    }
}

#[async_trait]
impl VoiceBackend for FakeBackend {
    async fn join(&self, channel: &ChannelId) -> Result<Arc<dyn VoiceChannel>, VoiceError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::NotConnected(channel.clone()));
        }
        let peer = FakeVoiceChannel::shared(channel);
        self.channels.insert(channel.clone(), peer.clone());
        Ok(peer)
    }
}

/// App that idles until cancelled and stops on a "stop" event.
pub struct NullApp {
    container: Container,
}

impl NullApp {
    pub fn new(container: Container) -> Self {
        Self { container }
    }
}

#[async_trait]
impl VoiceApp for NullApp {
    fn kind(&self) -> AppKind {
        self.container.kind()
    }

    async fn handle_event(&self, event: AppEvent) -> Result<(), AppError> {
        if event.name == "stop" {
            self.container.stop();
        }
        Ok(())
    }

    async fn run(&self) -> AnyResult<()> {
        self.container.cancel_token().cancelled().await;
        Ok(())
    }
}

/// Source with scripted claims, resolution and fetch behavior.
pub struct ScriptedSource {
    name: String,
    claims: Box<dyn Fn(&str) -> bool + Send + Sync>,
    resolution: Option<Resolution>,
    wav_samples: Option<Vec<i16>>,
    fail_fetch: bool,
    fetches: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(name: &str, claims: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            claims: Box::new(claims),
            resolution: None,
            wav_samples: None,
            fail_fetch: false,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Overrides the default single-track resolution.
    pub fn resolving(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Makes fetch write the given 48 kHz mono samples as a playable file.
    pub fn serving_wav(mut self, samples: Vec<i16>) -> Self {
        self.wav_samples = Some(samples);
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    /// Handle to the fetch counter, kept by the test before boxing.
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }
}

#[async_trait]
impl AudioSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, query: &str) -> bool {
        (self.claims)(query)
    }

    async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        if let Some(resolution) = &self.resolution {
            return Ok(resolution.clone());
        }
        Ok(Resolution::Track(TrackInfo {
            id: query.to_string(),
            title: query.to_string(),
            source: self.name.clone(),
        }))
    }

    async fn fetch(
        &self,
        info: &TrackInfo,
        workspace: &Path,
    ) -> Result<TrackPayload, MediaError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(MediaError::Download(format!("scripted failure: {}", info.id)));
        }
        let samples = self.wav_samples.clone().unwrap_or_else(|| vec![0i16; 960]);
        let path = workspace.join(format!("{}.wav", info.title.replace(' ', "_")));
        write_wav(&path, crate::voice::SAMPLE_RATE, 1, &samples);
        Ok(TrackPayload { path, owned: true })
    }
}

/// Minimal PCM WAV writer for test fixtures.
pub fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
    let mut data = Vec::new();
    for &s in samples {
        data.extend_from_slice(&s.to_le_bytes());
    }
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(rate * u32::from(channels) * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    std::fs::write(path, out).unwrap();
}

/// Speech stack whose answers are scripted per call.
pub struct FakeSpeech {
    window: usize,
    pub wake_hits: parking_lot::Mutex<std::collections::VecDeque<Option<usize>>>,
    pub transcripts: parking_lot::Mutex<std::collections::VecDeque<String>>,
    pub replies: parking_lot::Mutex<std::collections::VecDeque<String>>,
    pub spoken: parking_lot::Mutex<Vec<(String, String)>>,
    synth_samples: AtomicUsize,
}

impl FakeSpeech {
    pub fn shared(window: usize) -> Arc<Self> {
        Arc::new(Self {
            window,
            wake_hits: parking_lot::Mutex::new(Default::default()),
            transcripts: parking_lot::Mutex::new(Default::default()),
            replies: parking_lot::Mutex::new(Default::default()),
            spoken: parking_lot::Mutex::new(Vec::new()),
            synth_samples: AtomicUsize::new(960),
        })
    }

    /// Sample count returned by every synthesize call.
    pub fn set_synth_samples(&self, samples: usize) {
        self.synth_samples.store(samples, Ordering::SeqCst);
    }

    pub fn stack(self: &Arc<Self>) -> Arc<SpeechStack> {
        Arc::new(SpeechStack {
            wake: self.clone(),
            stt: self.clone(),
            tts: self.clone(),
            reply: self.clone(),
        })
    }

    pub fn queue_wake(&self, hit: Option<usize>) {
        self.wake_hits.lock().push_back(hit);
    }

    pub fn queue_transcript(&self, text: &str) {
        self.transcripts.lock().push_back(text.to_string());
    }

    pub fn queue_reply(&self, text: &str) {
        self.replies.lock().push_back(text.to_string());
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl WakeWordDetector for FakeSpeech {
    fn window_size(&self) -> usize {
        self.window
    }

    async fn detect(&self, _window: &[i16]) -> Result<Option<usize>, SpeechError> {
        Ok(self.wake_hits.lock().pop_front().flatten())
    }
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, _samples: &[i16], _rate: u32) -> Result<String, SpeechError> {
        Ok(self
            .transcripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| "".to_string()))
    }
}

#[async_trait]
impl TextToSpeech for FakeSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<i16>, SpeechError> {
        self.spoken
            .lock()
            .push((text.to_string(), voice.to_string()));
        Ok(vec![0i16; self.synth_samples.load(Ordering::SeqCst)])
    }
}

#[async_trait]
impl ReplyGenerator for FakeSpeech {
    async fn generate(
        &self,
        text: &str,
        _channel: &ChannelId,
        _personality: &str,
    ) -> Result<String, SpeechError> {
        Ok(self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| format!("echo: {}", text)))
    }
}

pub fn test_deps() -> Arc<AppDeps> {
    deps(Config::default(), SourceSet::with_sources(vec![]), None)
}

pub fn deps(
    config: Config,
    sources: SourceSet,
    speech: Option<Arc<SpeechStack>>,
) -> Arc<AppDeps> {
    Arc::new(AppDeps {
        config: Arc::new(config),
        sources: Arc::new(sources),
        speech,
    })
}
