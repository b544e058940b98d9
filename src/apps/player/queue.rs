//! Track queue backing the player.
//!
//! A track lives in three places at once: the visible list (what "list"
//! shows), the pending channel feeding the download task, and the ready
//! channel feeding playback. The ready channel's small capacity is what
//! limits how far downloads run ahead of playback.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::sources::{TrackInfo, TrackPayload};

pub struct Track {
    pub info: TrackInfo,
    payload: OnceLock<TrackPayload>,
    dropped: AtomicBool,
}

impl Track {
    pub fn new(info: TrackInfo) -> Arc<Self> {
        Arc::new(Self {
            info,
            payload: OnceLock::new(),
            dropped: AtomicBool::new(false),
        })
    }

    pub fn set_payload(&self, payload: TrackPayload) {
        let _ = self.payload.set(payload);
    }

    pub fn payload(&self) -> Option<&TrackPayload> {
        self.payload.get()
    }

    pub fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::SeqCst);
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

pub struct TrackQueue {
    max_len: usize,
    visible: parking_lot::Mutex<std::collections::VecDeque<Arc<Track>>>,
    pending_tx: flume::Sender<Arc<Track>>,
    pending_rx: flume::Receiver<Arc<Track>>,
    ready_tx: flume::Sender<Arc<Track>>,
    ready_rx: flume::Receiver<Arc<Track>>,
}

impl TrackQueue {
    pub fn new(max_len: usize, ready_capacity: usize) -> Self {
        let (pending_tx, pending_rx) = flume::bounded(max_len.max(1));
        let (ready_tx, ready_rx) = flume::bounded(ready_capacity.max(1));
        Self {
            max_len: max_len.max(1),
            visible: parking_lot::Mutex::new(Default::default()),
            pending_tx,
            pending_rx,
            ready_tx,
            ready_rx,
        }
    }

    /// Admits as many of `infos` as fit, in order. Returns the admitted
    /// tracks and how many were turned away.
    pub fn admit(&self, infos: Vec<TrackInfo>) -> (Vec<Arc<Track>>, usize) {
        let mut visible = self.visible.lock();
        let mut admitted = Vec::new();
        let mut rejected = 0;
        for info in infos {
            if visible.len() >= self.max_len {
                rejected += 1;
                continue;
            }
            let track = Track::new(info);
            // Pending can lag the visible list when tracks get dropped,
            // so it may fill up first.
            if self.pending_tx.try_send(track.clone()).is_ok() {
                visible.push_back(track.clone());
                admitted.push(track);
            } else {
                rejected += 1;
            }
        }
        (admitted, rejected)
    }

    /// Removes a played track from the visible list.
    pub fn pop_played(&self, track: &Arc<Track>) {
        let mut visible = self.visible.lock();
        if let Some(pos) = visible.iter().position(|t| Arc::ptr_eq(t, track)) {
            visible.remove(pos);
        }
    }

    /// Marks a track dead and hides it. The download and playback tasks
    /// skip dropped tracks when they surface.
    pub fn drop_track(&self, track: &Arc<Track>) {
        track.mark_dropped();
        self.pop_played(track);
    }

    pub fn snapshot(&self) -> Vec<Arc<Track>> {
        self.visible.lock().iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.visible.lock().len()
    }

    pub(super) fn pending(&self) -> flume::Receiver<Arc<Track>> {
        self.pending_rx.clone()
    }

    pub(super) fn ready_sender(&self) -> flume::Sender<Arc<Track>> {
        self.ready_tx.clone()
    }

    pub(super) fn ready(&self) -> flume::Receiver<Arc<Track>> {
        self.ready_rx.clone()
    }
}
