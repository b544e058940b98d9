//! Best-effort coordination signals between the apps of one session.
//!
//! All channels are rendezvous channels: a send completes only while a
//! receiver is actively waiting. Every send is bounded by a short timeout,
//! and a timeout means nobody was listening, which is never an error.

use std::time::Duration;

use crate::apps::AppKind;

/// How long a signal send waits for a listener before giving up.
pub const SIGNAL_TIMEOUT: Duration = Duration::from_millis(10);

/// Sends `value`, giving up after [`SIGNAL_TIMEOUT`]. Returns whether a
/// listener took the value.
pub(crate) async fn send_within<T: Send>(tx: &flume::Sender<T>, value: T) -> bool {
    matches!(
        tokio::time::timeout(SIGNAL_TIMEOUT, tx.send_async(value)).await,
        Ok(Ok(()))
    )
}

/// The shared signal channels of one voice session.
pub struct SignalBus {
    pause_tx: flume::Sender<()>,
    pause_rx: flume::Receiver<()>,
    resume_last_tx: flume::Sender<()>,
    resume_last_rx: flume::Receiver<()>,
    last_active_tx: flume::Sender<AppKind>,
    last_active_rx: flume::Receiver<AppKind>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (pause_tx, pause_rx) = flume::bounded(0);
        let (resume_last_tx, resume_last_rx) = flume::bounded(0);
        let (last_active_tx, last_active_rx) = flume::bounded(0);
        Self {
            pause_tx,
            pause_rx,
            resume_last_tx,
            resume_last_rx,
            last_active_tx,
            last_active_rx,
        }
    }

    /// Asks whoever is currently streaming to yield the output. The holder
    /// only hears this while parked in its frame loop, which is the only
    /// moment yielding is safe.
    pub async fn request_pause(&self) -> bool {
        send_within(&self.pause_tx, ()).await
    }

    /// Asks the session to wake whichever app last gave up the output.
    pub async fn request_resume_last(&self) -> bool {
        send_within(&self.resume_last_tx, ()).await
    }

    /// Records the sender as the most recent output holder. Called by the
    /// holder itself, right before it starts waiting for resume.
    pub async fn notify_last_active(&self, kind: AppKind) -> bool {
        send_within(&self.last_active_tx, kind).await
    }

    /// Receiver the current output holder parks on while streaming.
    pub fn pause_signals(&self) -> flume::Receiver<()> {
        self.pause_rx.clone()
    }

    pub(crate) fn resume_last_signals(&self) -> flume::Receiver<()> {
        self.resume_last_rx.clone()
    }

    pub(crate) fn last_active_signals(&self) -> flume::Receiver<AppKind> {
        self.last_active_rx.clone()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
