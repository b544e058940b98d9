//! Hands-free voice conversation.
//!
//! Inbound audio is downsampled and scored for wake words in fixed
//! windows. A hit starts a turn: speak the personality's acknowledgement,
//! capture the utterance until a silence gap, transcribe it, generate a
//! reply and speak it. Replies play on their own task so the loop is
//! already listening for the next wake word.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::apps::speak::speak;
use crate::apps::{AppDeps, AppError, AppEvent, AppKind, VoiceApp};
use crate::audio::MonoResampler;
use crate::common::AnyResult;
use crate::configs::SpeechConfig;
use crate::session::Container;
use crate::speech::SpeechStack;
use crate::voice::SAMPLE_RATE;

/// Sample rate the wake detector and transcriber consume.
const WAKE_RATE: u32 = 16_000;

pub struct ConversationApp {
    container: Arc<Container>,
    speech: Arc<SpeechStack>,
    config: SpeechConfig,
    replies: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ConversationApp {
    pub fn new(container: Container, deps: Arc<AppDeps>) -> AnyResult<Self> {
        let speech = deps
            .speech
            .clone()
            .ok_or("conversation requires a speech stack")?;
        let config = deps
            .config
            .speech
            .clone()
            .ok_or("conversation requires [speech] configuration")?;
        Ok(Self {
            container: Arc::new(container),
            speech,
            config,
            replies: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// One full exchange after a wake word: ack, capture, transcribe,
    /// reply. The reply is spoken on a separate task.
    async fn turn(&self, keyword: usize, frames: &flume::Receiver<Vec<i16>>) -> AnyResult<()> {
        let Some(personality) = self.config.personalities.get(keyword).cloned() else {
            warn!("Wake keyword index {} has no personality", keyword);
            return Ok(());
        };
        debug!(
            "Wake word for {} in channel {}",
            personality.name,
            self.container.channel().channel_id()
        );

        // Anything buffered before the ack is wake-word tail, not speech.
        while frames.try_recv().is_ok() {}
        speak(
            &self.container,
            &self.speech,
            &personality.voice,
            &personality.ack,
        )
        .await?;

        let cutoff = self.config.utterance_cutoff();
        let mut utterance: Vec<i16> = Vec::new();
        loop {
            match tokio::time::timeout(cutoff, frames.recv_async()).await {
                Ok(Ok(frame)) => utterance.extend_from_slice(&frame),
                Ok(Err(_)) => break,
                // Silence gap: the utterance is over.
                Err(_) => break,
            }
        }
        if utterance.is_empty() {
            debug!("Nothing heard after the wake word");
            return Ok(());
        }

        let text = self.speech.stt.transcribe(&utterance, WAKE_RATE).await?;
        if text.trim().is_empty() {
            return Ok(());
        }
        info!("Heard {:?} for {}", text, personality.name);

        let reply = self
            .speech
            .reply
            .generate(&text, self.container.channel().channel_id(), &personality.name)
            .await?;

        self.prune_replies();
        let container = self.container.clone();
        let speech = self.speech.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = speak(&container, &speech, &personality.voice, &reply).await {
                warn!("Reply playback failed: {}", err);
            }
        });
        self.replies.lock().push(handle);
        Ok(())
    }

    fn prune_replies(&self) {
        self.replies.lock().retain(|handle| !handle.is_finished());
    }
}

#[async_trait]
impl VoiceApp for ConversationApp {
    fn kind(&self) -> AppKind {
        self.container.kind()
    }

    async fn handle_event(&self, event: AppEvent) -> Result<(), AppError> {
        match event.name.as_str() {
            // Construction already started the loop; nothing extra to do.
            "start" => Ok(()),
            "stop" => {
                self.container.stop();
                Ok(())
            }
            other => Err(AppError::UnknownEvent(other.to_string())),
        }
    }

    async fn run(&self) -> AnyResult<()> {
        let (frame_tx, frame_rx) = flume::bounded::<Vec<i16>>(64);

        // Pump inbound channel audio down to the wake rate.
        let pump = {
            let container = self.container.clone();
            tokio::spawn(async move {
                let mut resampler = MonoResampler::new(SAMPLE_RATE, WAKE_RATE);
                let mut scratch = Vec::new();
                loop {
                    tokio::select! {
                        _ = container.cancel_token().cancelled() => break,
                        frame = container.channel().recv_frame() => {
                            let Ok(frame) = frame else { break };
                            scratch.clear();
                            resampler.process(&frame, &mut scratch);
                            if !scratch.is_empty()
                                && frame_tx.send_async(scratch.clone()).await.is_err()
                            {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let window_size = self.speech.wake.window_size().max(1);
        let mut window: Vec<i16> = Vec::with_capacity(window_size * 2);
        let idle = self.config.idle();
        let mut deadline = Instant::now() + idle;

        loop {
            tokio::select! {
                _ = self.container.cancel_token().cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {
                    info!(
                        "Conversation in {} heard no wake word for {:?}, leaving",
                        self.container.channel().channel_id(),
                        idle
                    );
                    break;
                }
                frame = frame_rx.recv_async() => {
                    let Ok(frame) = frame else { break };
                    window.extend_from_slice(&frame);
                    while window.len() >= window_size {
                        let scored: Vec<i16> = window.drain(..window_size).collect();
                        match self.speech.wake.detect(&scored).await {
                            Ok(Some(keyword)) => {
                                window.clear();
                                if let Err(err) = self.turn(keyword, &frame_rx).await {
                                    warn!("Conversation turn failed: {}", err);
                                }
                                deadline = Instant::now() + idle;
                                break;
                            }
                            Ok(None) => {}
                            Err(err) => warn!("Wake scoring failed: {}", err),
                        }
                    }
                }
            }
        }

        // Let in-flight replies finish before tearing the pump down.
        let pending: Vec<_> = self.replies.lock().drain(..).collect();
        for handle in pending {
            let _ = handle.await;
        }
        self.container.stop();
        let _ = pump.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::apps::ReplySink;
    use crate::configs::{Config, PersonalityConfig};
    use crate::session::{SharedOutput, SignalBus};
    use crate::sources::SourceSet;
    use crate::testutil::{FakeSpeech, FakeVoiceChannel, deps};
    use crate::voice::{FRAME_SAMPLES, VoiceChannel};

    fn conversation_setup(
        idle_secs: u64,
    ) -> (Arc<ConversationApp>, Arc<FakeVoiceChannel>, Arc<FakeSpeech>) {
        let channel = FakeVoiceChannel::shared("general");
        let output = SharedOutput::new(channel.clone() as Arc<dyn VoiceChannel>);
        let bus = Arc::new(SignalBus::new());
        let parent = CancellationToken::new();
        let container = Container::new(
            AppKind::Conversation,
            channel.clone() as Arc<dyn VoiceChannel>,
            output,
            bus,
            &parent,
        );

        // One 48 kHz frame folds down to exactly one scoring window.
        let speech = FakeSpeech::shared(320);
        let config = Config {
            speech: Some(crate::configs::SpeechConfig {
                utterance_cutoff_ms: 100,
                idle_secs,
                personalities: vec![PersonalityConfig {
                    name: "Ada".to_string(),
                    keyword: "hey ada".to_string(),
                    voice: "en-2".to_string(),
                    ack: "Yes?".to_string(),
                }],
                ..crate::configs::SpeechConfig::default()
            }),
            ..Config::default()
        };
        let deps = deps(config, SourceSet::with_sources(vec![]), Some(speech.stack()));
        let app = Arc::new(ConversationApp::new(container, deps).unwrap());
        (app, channel, speech)
    }

    #[tokio::test]
    async fn wake_word_drives_a_full_turn() {
        let (app, channel, speech) = conversation_setup(5);
        speech.queue_wake(Some(0));
        speech.queue_transcript("play something calm");
        speech.queue_reply("On it");

        let task = {
            let app = app.clone();
            tokio::spawn(async move { app.run().await })
        };

        channel.push_frame(vec![0i16; FRAME_SAMPLES]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..3 {
            channel.push_frame(vec![0i16; FRAME_SAMPLES]);
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(speech.spoken_texts(), ["Yes?", "On it"]);
        assert_eq!(speech.spoken.lock()[0].1, "en-2");
        assert_eq!(channel.sent_count(), 2);
        assert!(!channel.is_speaking());

        app.handle_event(AppEvent::new("stop", vec![], ReplySink::disabled()))
            .await
            .unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn silence_after_the_ack_ends_the_turn_quietly() {
        let (app, channel, speech) = conversation_setup(5);
        speech.queue_wake(Some(0));

        let task = {
            let app = app.clone();
            tokio::spawn(async move { app.run().await })
        };

        channel.push_frame(vec![0i16; FRAME_SAMPLES]);
        tokio::time::sleep(Duration::from_millis(300)).await;
        // Only the ack was spoken; no transcript, no reply.
        assert_eq!(speech.spoken_texts(), ["Yes?"]);

        app.handle_event(AppEvent::new("stop", vec![], ReplySink::disabled()))
            .await
            .unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn quiet_channel_idles_out() {
        let (app, _channel, speech) = conversation_setup(1);
        let started = std::time::Instant::now();
        app.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert!(speech.spoken_texts().is_empty());
    }

    #[tokio::test]
    async fn unknown_events_are_rejected() {
        let (app, _channel, _speech) = conversation_setup(5);
        let err = app
            .handle_event(AppEvent::new("hum", vec![], ReplySink::disabled()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownEvent(name) if name == "hum"));
    }
}
