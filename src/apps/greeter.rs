//! One-shot announcement app.
//!
//! Joins, waits briefly for an announcement to arrive, speaks it and
//! exits. Useful for "someone joined" style greetings pushed by an
//! outside integration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::apps::speak::speak;
use crate::apps::{AppDeps, AppError, AppEvent, AppKind, VoiceApp};
use crate::common::AnyResult;
use crate::session::Container;
use crate::speech::SpeechStack;

pub struct GreeterApp {
    container: Container,
    speech: Arc<SpeechStack>,
    voice: String,
    timeout: Duration,
    cmd_tx: flume::Sender<String>,
    cmd_rx: flume::Receiver<String>,
}

impl GreeterApp {
    pub fn new(container: Container, deps: Arc<AppDeps>) -> AnyResult<Self> {
        let speech = deps
            .speech
            .clone()
            .ok_or("greeter requires a speech stack")?;
        let config = deps
            .config
            .speech
            .clone()
            .ok_or("greeter requires [speech] configuration")?;
        // One buffered slot so an announce sent right at construction is
        // not lost while the run task is still starting.
        let (cmd_tx, cmd_rx) = flume::bounded(1);
        let timeout = config.greeter_timeout();
        Ok(Self {
            container,
            speech,
            voice: config.voice,
            timeout,
            cmd_tx,
            cmd_rx,
        })
    }
}

#[async_trait]
impl VoiceApp for GreeterApp {
    fn kind(&self) -> AppKind {
        self.container.kind()
    }

    async fn handle_event(&self, event: AppEvent) -> Result<(), AppError> {
        match event.name.as_str() {
            "announce" => {
                // A second announce while one is pending is dropped.
                let _ = self.cmd_tx.try_send(event.text());
                Ok(())
            }
            other => Err(AppError::UnknownEvent(other.to_string())),
        }
    }

    async fn run(&self) -> AnyResult<()> {
        tokio::select! {
            _ = self.container.cancel_token().cancelled() => Ok(()),
            _ = tokio::time::sleep(self.timeout) => {
                debug!(
                    "Greeter in {} had nothing to say",
                    self.container.channel().channel_id()
                );
                Ok(())
            }
            cmd = self.cmd_rx.recv_async() => match cmd {
                Ok(text) => speak(&self.container, &self.speech, &self.voice, &text).await,
                Err(_) => Ok(()),
            },
        }
    }
}
