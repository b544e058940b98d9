//! Registry of live sessions, keyed by voice channel.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::apps::{AppDeps, AppEvent, AppKind, AppRegistry, EventError};
use crate::common::ChannelId;
use crate::session::supervisor::VoiceSession;
use crate::voice::{VoiceBackend, VoiceError};

const IDLE_TICK: Duration = Duration::from_millis(500);

/// Owns every live [`VoiceSession`] and creates them on demand.
pub struct SessionRegistry {
    sessions: Arc<DashMap<ChannelId, Arc<VoiceSession>>>,
    backend: Arc<dyn VoiceBackend>,
    apps: Arc<AppRegistry>,
    deps: Arc<AppDeps>,
    root: CancellationToken,
    loops: TaskTracker,
    join_lock: tokio::sync::Mutex<()>,
    idle_tick: Duration,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn VoiceBackend>, apps: Arc<AppRegistry>, deps: Arc<AppDeps>) -> Self {
        Self::with_idle_tick(backend, apps, deps, IDLE_TICK)
    }

    pub fn with_idle_tick(
        backend: Arc<dyn VoiceBackend>,
        apps: Arc<AppRegistry>,
        deps: Arc<AppDeps>,
        idle_tick: Duration,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            backend,
            apps,
            deps,
            root: CancellationToken::new(),
            loops: TaskTracker::new(),
            join_lock: tokio::sync::Mutex::new(()),
            idle_tick,
        }
    }

    /// Delivers `event` to app `kind` in `channel`, joining the channel
    /// and constructing the app as needed.
    pub async fn send_event(
        &self,
        channel: &ChannelId,
        kind: AppKind,
        event: AppEvent,
    ) -> Result<(), EventError> {
        if self.root.is_cancelled() {
            return Err(EventError::Connect(VoiceError::Closed));
        }
        if !self.apps.is_registered(kind) {
            return Err(EventError::UnknownApp(kind.to_string()));
        }
        let session = self.find_or_join(channel).await?;
        session.dispatch(kind, event).await
    }

    async fn find_or_join(&self, channel: &ChannelId) -> Result<Arc<VoiceSession>, EventError> {
        // A cancelled session is still winding down; treat it as absent and
        // join again rather than dispatching into it.
        if let Some(session) = self.sessions.get(channel) {
            if !session.is_cancelled() {
                return Ok(session.clone());
            }
        }

        // Serialize joins so two concurrent events for a fresh channel
        // produce one session.
        let _join = self.join_lock.lock().await;
        if let Some(session) = self.sessions.get(channel) {
            if !session.is_cancelled() {
                return Ok(session.clone());
            }
        }

        let connection = self.backend.join(channel).await?;
        info!("Joined voice channel {}", channel);
        let session = VoiceSession::spawn(
            channel.clone(),
            connection,
            self.apps.clone(),
            self.deps.clone(),
            self.sessions.clone(),
            &self.root,
            &self.loops,
            self.idle_tick,
        );
        self.sessions.insert(channel.clone(), session.clone());
        Ok(session)
    }

    pub fn has_session(&self, channel: &ChannelId) -> bool {
        self.sessions.contains_key(channel)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Cancels every session and waits for their supervision loops, which
    /// in turn wait for their app tasks.
    pub async fn shutdown(&self) {
        info!("Shutting down {} session(s)", self.sessions.len());
        self.root.cancel();
        self.loops.close();
        self.loops.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::apps::ReplySink;
    use crate::testutil::{FakeBackend, NullApp, test_deps};

    fn null_registry() -> Arc<AppRegistry> {
        let mut apps = AppRegistry::new();
        apps.register(AppKind::Player, |container, _deps| {
            Ok(Arc::new(NullApp::new(container)))
        });
        Arc::new(apps)
    }

    fn event(name: &str) -> AppEvent {
        AppEvent::new(name, vec![], ReplySink::disabled())
    }

    #[tokio::test]
    async fn unregistered_app_is_rejected_without_joining() {
        let backend = FakeBackend::shared();
        let registry = SessionRegistry::new(
            backend.clone(),
            Arc::new(AppRegistry::new()),
            test_deps(),
        );

        let err = registry
            .send_event(&ChannelId::from("general"), AppKind::Player, event("noop"))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::UnknownApp(_)));
        assert_eq!(backend.join_count(), 0);
        assert_eq!(registry.session_count(), 0);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn join_failure_surfaces_and_leaves_no_session() {
        let backend = FakeBackend::shared();
        backend.fail_joins(true);
        let registry = SessionRegistry::new(backend.clone(), null_registry(), test_deps());

        let err = registry
            .send_event(&ChannelId::from("general"), AppKind::Player, event("noop"))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Connect(_)));
        assert!(!registry.has_session(&ChannelId::from("general")));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn channel_joins_once_across_events() {
        let backend = FakeBackend::shared();
        let registry = SessionRegistry::new(backend.clone(), null_registry(), test_deps());
        let channel = ChannelId::from("general");

        registry
            .send_event(&channel, AppKind::Player, event("noop"))
            .await
            .unwrap();
        registry
            .send_event(&channel, AppKind::Player, event("noop"))
            .await
            .unwrap();
        assert_eq!(backend.join_count(), 1);
        assert_eq!(registry.session_count(), 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_disconnects_live_channels() {
        let backend = FakeBackend::shared();
        let registry = SessionRegistry::new(backend.clone(), null_registry(), test_deps());
        let channel = ChannelId::from("general");

        registry
            .send_event(&channel, AppKind::Player, event("noop"))
            .await
            .unwrap();
        registry.shutdown().await;

        let peer = backend.channel(&channel).unwrap();
        assert!(peer.is_disconnected());
        let err = registry
            .send_event(&channel, AppKind::Player, event("noop"))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Connect(VoiceError::Closed)));
    }

    #[tokio::test]
    async fn empty_session_ages_out_of_the_registry() {
        let backend = FakeBackend::shared();
        let registry = SessionRegistry::with_idle_tick(
            backend.clone(),
            null_registry(),
            test_deps(),
            Duration::from_millis(20),
        );
        let channel = ChannelId::from("general");

        registry
            .send_event(&channel, AppKind::Player, event("stop"))
            .await
            .unwrap();
        // NullApp exits on "stop"; the reaper then finds no apps.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!registry.has_session(&channel));

        registry.shutdown().await;
    }
}
