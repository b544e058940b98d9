//! One supervisor per joined voice channel.
//!
//! The supervisor owns the voice connection and its shared output, builds
//! apps on first use, relays resume-last signals to whichever app most
//! recently gave up the output, and tears the whole session down once no
//! apps remain.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::apps::{AppDeps, AppError, AppEvent, AppKind, AppRegistry, EventError, VoiceApp};
use crate::common::ChannelId;
use crate::session::container::Container;
use crate::session::output::SharedOutput;
use crate::session::signals::{SignalBus, send_within};
use crate::voice::{VoiceChannel, VoiceError};

struct AppSlot {
    app: Arc<dyn VoiceApp>,
    resume_tx: flume::Sender<()>,
}

/// Supervisor state for a single voice channel.
pub struct VoiceSession {
    channel_id: ChannelId,
    channel: Arc<dyn VoiceChannel>,
    output: Arc<SharedOutput>,
    bus: Arc<SignalBus>,
    apps: DashMap<AppKind, AppSlot>,
    last_active: parking_lot::Mutex<Option<AppKind>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    registry: Arc<AppRegistry>,
    deps: Arc<AppDeps>,
    sessions: Arc<DashMap<ChannelId, Arc<VoiceSession>>>,
    idle_tick: Duration,
}

impl VoiceSession {
    /// Builds the session and starts its supervision loop on `loops`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        channel_id: ChannelId,
        channel: Arc<dyn VoiceChannel>,
        registry: Arc<AppRegistry>,
        deps: Arc<AppDeps>,
        sessions: Arc<DashMap<ChannelId, Arc<VoiceSession>>>,
        root: &CancellationToken,
        loops: &TaskTracker,
        idle_tick: Duration,
    ) -> Arc<Self> {
        let output = SharedOutput::new(channel.clone());
        let session = Arc::new(Self {
            channel_id,
            channel,
            output,
            bus: Arc::new(SignalBus::new()),
            apps: DashMap::new(),
            last_active: parking_lot::Mutex::new(None),
            cancel: root.child_token(),
            tracker: TaskTracker::new(),
            registry,
            deps,
            sessions,
            idle_tick,
        });
        loops.spawn(session.clone().run_loop());
        session
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn bus(&self) -> &Arc<SignalBus> {
        &self.bus
    }

    #[cfg(test)]
    pub(crate) fn last_active(&self) -> Option<AppKind> {
        *self.last_active.lock()
    }

    /// Routes an event to the addressed app, constructing it first if it
    /// is not running yet.
    pub(crate) async fn dispatch(
        self: &Arc<Self>,
        kind: AppKind,
        event: AppEvent,
    ) -> Result<(), EventError> {
        if self.cancel.is_cancelled() {
            return Err(EventError::Connect(VoiceError::Closed));
        }
        let app = self.ensure_app(kind)?;
        app.handle_event(event).await.map_err(|err| match err {
            AppError::UnknownEvent(name) => EventError::UnknownEvent(name),
            other => EventError::App(other),
        })
    }

    fn ensure_app(self: &Arc<Self>, kind: AppKind) -> Result<Arc<dyn VoiceApp>, EventError> {
        let app = match self.apps.entry(kind) {
            Entry::Occupied(slot) => return Ok(slot.get().app.clone()),
            Entry::Vacant(vacant) => {
                let container = Container::new(
                    kind,
                    self.channel.clone(),
                    self.output.clone(),
                    self.bus.clone(),
                    &self.cancel,
                );
                let resume_tx = container.resume_sender();
                let app = self
                    .registry
                    .construct(kind, container, self.deps.clone())
                    .map_err(|err| EventError::App(AppError::Failed(err.to_string())))?;
                vacant.insert(AppSlot {
                    app: app.clone(),
                    resume_tx,
                });
                app
            }
        };

        let session = self.clone();
        let task = app.clone();
        self.tracker.spawn(async move {
            info!("Started app {} in channel {}", kind, session.channel_id);
            if let Err(err) = task.run().await {
                error!("App {} in channel {} failed: {}", kind, session.channel_id, err);
            }
            session.apps.remove(&kind);
            debug!("App {} exited in channel {}", kind, session.channel_id);
        });
        Ok(app)
    }

    async fn run_loop(self: Arc<Self>) {
        let resume_last_rx = self.bus.resume_last_signals();
        let last_active_rx = self.bus.last_active_signals();
        let mut idle = interval_at(Instant::now() + self.idle_tick, self.idle_tick);
        idle.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                signal = last_active_rx.recv_async() => {
                    if let Ok(kind) = signal {
                        *self.last_active.lock() = Some(kind);
                    }
                }
                signal = resume_last_rx.recv_async() => {
                    if signal.is_ok() {
                        self.resume_last().await;
                    }
                }
                _ = idle.tick() => {
                    if self.apps.is_empty() {
                        debug!("No active apps left in channel {}", self.channel_id);
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Forwards a resume signal to the app recorded as the last output
    /// holder. A holder that already exited just clears the record.
    async fn resume_last(&self) {
        let Some(kind) = *self.last_active.lock() else {
            return;
        };
        let resume_tx = match self.apps.get(&kind) {
            Some(slot) => slot.resume_tx.clone(),
            None => {
                *self.last_active.lock() = None;
                return;
            }
        };
        if !send_within(&resume_tx, ()).await {
            debug!(
                "Resume for {} in channel {} found no listener",
                kind, self.channel_id
            );
        }
    }

    async fn teardown(&self) {
        info!("Closing session for channel {}", self.channel_id);
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.channel.disconnect().await;
        // A replacement session may already occupy this slot; only remove
        // our own entry.
        self.sessions
            .remove_if(&self.channel_id, |_, live| {
                std::ptr::eq(Arc::as_ptr(live), self)
            });
        debug!("Session for channel {} closed", self.channel_id);
    }
}
