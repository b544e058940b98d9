use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::common::types::AnyResult;
use crate::configs::Config;
use crate::session::Container;
use crate::sources::SourceSet;
use crate::speech::SpeechStack;
use crate::voice::VoiceError;

pub mod conversation;
pub mod greeter;
pub mod player;
pub mod speak;

pub use conversation::ConversationApp;
pub use greeter::GreeterApp;
pub use player::QueuePlayer;

/// The kinds of apps a voice session can host. At most one instance of
/// each kind runs per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppKind {
    Player,
    Conversation,
    Greeter,
}

impl AppKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Conversation => "conversation",
            Self::Greeter => "greeter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "player" => Some(Self::Player),
            "conversation" => Some(Self::Conversation),
            "greeter" => Some(Self::Greeter),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort channel for user-visible confirmations. Sends to a caller
/// that has gone away are silently dropped.
#[derive(Clone)]
pub struct ReplySink {
    tx: Option<flume::Sender<String>>,
}

impl ReplySink {
    pub fn new(tx: flume::Sender<String>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(text.into());
        }
    }
}

/// One caller-initiated event, dispatched to an app by name.
pub struct AppEvent {
    pub name: String,
    pub args: Vec<String>,
    pub reply: ReplySink,
}

impl AppEvent {
    pub fn new(name: impl Into<String>, args: Vec<String>, reply: ReplySink) -> Self {
        Self {
            name: name.into(),
            args,
            reply,
        }
    }

    /// The event arguments joined back into one free-form string.
    pub fn text(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("{0}")]
    Failed(String),
}

/// Errors surfaced to the caller of an event dispatch.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown app: {0}")]
    UnknownApp(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("could not join voice channel: {0}")]
    Connect(#[from] VoiceError),
    #[error(transparent)]
    App(#[from] AppError),
}

/// A long-running audio producer living inside one voice session.
///
/// `handle_event` reacts to caller events and must return promptly;
/// `run` is the app's main loop, spawned once at construction and awaited
/// by the session on teardown. When `run` returns the app's slot is
/// vacated and a later event builds a fresh instance.
#[async_trait]
pub trait VoiceApp: Send + Sync {
    fn kind(&self) -> AppKind;

    async fn handle_event(&self, event: AppEvent) -> Result<(), AppError>;

    async fn run(&self) -> AnyResult<()>;
}

/// Everything an app constructor may need besides its container.
pub struct AppDeps {
    pub config: Arc<Config>,
    pub sources: Arc<SourceSet>,
    pub speech: Option<Arc<SpeechStack>>,
}

type AppCtor =
    Box<dyn Fn(Container, Arc<AppDeps>) -> AnyResult<Arc<dyn VoiceApp>> + Send + Sync>;

/// Per-kind constructors. Sessions build app instances lazily through
/// this registry on the first event for a kind.
pub struct AppRegistry {
    ctors: HashMap<AppKind, AppCtor>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: AppKind, ctor: F)
    where
        F: Fn(Container, Arc<AppDeps>) -> AnyResult<Arc<dyn VoiceApp>> + Send + Sync + 'static,
    {
        info!("Registered app: {}", kind);
        self.ctors.insert(kind, Box::new(ctor));
    }

    /// Registers the built-in apps. Conversation and greeter need the
    /// speech stack, so they only appear when `[speech]` is configured.
    pub fn builtin(config: &Config) -> Self {
        let mut registry = Self::new();

        registry.register(AppKind::Player, |container, deps| {
            Ok(Arc::new(QueuePlayer::new(container, deps)))
        });

        if config.speech.is_some() {
            registry.register(AppKind::Conversation, |container, deps| {
                Ok(Arc::new(ConversationApp::new(container, deps)?))
            });
            registry.register(AppKind::Greeter, |container, deps| {
                Ok(Arc::new(GreeterApp::new(container, deps)?))
            });
        }

        registry
    }

    pub fn is_registered(&self, kind: AppKind) -> bool {
        self.ctors.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<AppKind> {
        self.ctors.keys().copied().collect()
    }

    pub(crate) fn construct(
        &self,
        kind: AppKind,
        container: Container,
        deps: Arc<AppDeps>,
    ) -> AnyResult<Arc<dyn VoiceApp>> {
        let ctor = self
            .ctors
            .get(&kind)
            .ok_or_else(|| format!("app not registered: {}", kind))?;
        ctor(container, deps)
    }
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}
