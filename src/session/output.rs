//! Exclusive ownership of a session's outbound audio stream.

use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::apps::AppKind;
use crate::voice::VoiceChannel;

/// The single outbound stream of a voice channel. At most one app holds it
/// at a time; everyone else waits on the inner lock.
pub struct SharedOutput {
    lock: Arc<AsyncMutex<()>>,
    holder: parking_lot::Mutex<Option<AppKind>>,
    channel: Arc<dyn VoiceChannel>,
}

impl SharedOutput {
    pub fn new(channel: Arc<dyn VoiceChannel>) -> Arc<Self> {
        Arc::new(Self {
            lock: Arc::new(AsyncMutex::new(())),
            holder: parking_lot::Mutex::new(None),
            channel,
        })
    }

    /// Waits for the output to become free and claims it for `kind`. The
    /// speaking flag goes up before the grant is handed out, so a remote
    /// peer never sees audio frames from a non-speaking session.
    pub async fn lock(self: Arc<Self>, kind: AppKind) -> OutputGrant {
        let guard = self.lock.clone().lock_owned().await;
        *self.holder.lock() = Some(kind);
        self.channel.set_speaking(true);
        OutputGrant {
            output: self,
            kind,
            guard: Some(guard),
        }
    }

    /// Which app currently holds the output, if any.
    pub fn holder(&self) -> Option<AppKind> {
        *self.holder.lock()
    }

    pub fn channel(&self) -> &Arc<dyn VoiceChannel> {
        &self.channel
    }
}

/// Proof of exclusive output ownership. Dropping the grant releases the
/// lock, clears the holder and lowers the speaking flag, so an app that
/// exits early (or panics) can never wedge the session.
pub struct OutputGrant {
    output: Arc<SharedOutput>,
    kind: AppKind,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OutputGrant {
    pub fn kind(&self) -> AppKind {
        self.kind
    }
}

impl Drop for OutputGrant {
    fn drop(&mut self) {
        // The inner lock must outlive the holder bookkeeping, or the next
        // claimant could record itself before this one is cleared.
        if let Some(guard) = self.guard.take() {
            *self.output.holder.lock() = None;
            self.output.channel.set_speaking(false);
            drop(guard);
        }
    }
}
