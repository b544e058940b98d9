//! Queue player app.
//!
//! Owns a per-session download workspace and two background tasks wired
//! through [`TrackQueue`]: downloads fill a small ready buffer, playback
//! drains it onto the voice channel. Events mutate the queue or poke the
//! tasks over rendezvous channels.

mod download;
mod playback;
mod queue;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::apps::{AppDeps, AppError, AppEvent, AppKind, ReplySink, VoiceApp};
use crate::common::AnyResult;
use crate::common::ids::WorkspaceId;
use crate::session::Container;
use crate::session::signals::send_within;
use crate::sources::Resolution;

use download::run_downloads;
use playback::run_playback;
use queue::TrackQueue;

pub struct QueuePlayer {
    container: Arc<Container>,
    deps: Arc<AppDeps>,
    queue: Arc<TrackQueue>,
    workspace: PathBuf,
    workspace_id: WorkspaceId,
    next_tx: flume::Sender<()>,
    next_rx: flume::Receiver<()>,
    /// Reply sink of the most recent queue or stop event. Playback posts
    /// "Playing track [ ... ]" notices here.
    notices: Arc<parking_lot::Mutex<ReplySink>>,
    started_at: Instant,
}

impl QueuePlayer {
    pub fn new(container: Container, deps: Arc<AppDeps>) -> Self {
        let player = &deps.config.player;
        let queue = Arc::new(TrackQueue::new(player.max_queue_len, player.ready_capacity));
        let workspace_id = WorkspaceId::reserve();
        let workspace = deps
            .config
            .audio
            .workspace_root()
            .join(workspace_id.as_str());
        let (next_tx, next_rx) = flume::bounded(0);
        Self {
            container: Arc::new(container),
            deps,
            queue,
            workspace,
            workspace_id,
            next_tx,
            next_rx,
            notices: Arc::new(parking_lot::Mutex::new(ReplySink::disabled())),
            started_at: Instant::now(),
        }
    }

    async fn enqueue(&self, event: &AppEvent) {
        let query = event.text();
        if query.is_empty() {
            event.reply.send("Usage: queue <url or library query>");
            return;
        }
        *self.notices.lock() = event.reply.clone();

        let resolution = match self.deps.sources.resolve(&query).await {
            Ok(resolution) => resolution,
            Err(err) => {
                event.reply.send(format!("Cannot play that: {}", err));
                return;
            }
        };
        match resolution {
            Resolution::Track(info) => {
                let title = info.title.clone();
                let (admitted, _) = self.queue.admit(vec![info]);
                if admitted.len() == 1 {
                    event
                        .reply
                        .send(format!("Added track [ {} ] to the queue", title));
                } else {
                    event.reply.send("Max queue length reached");
                }
            }
            Resolution::Playlist { name, tracks } => {
                let (admitted, rejected) = self.queue.admit(tracks);
                debug!("Expanded {} into {} tracks", name, admitted.len());
                if admitted.len() <= self.deps.config.player.queue_display {
                    for track in &admitted {
                        event
                            .reply
                            .send(format!("Added track [ {} ] to the queue", track.info.title));
                    }
                } else {
                    event
                        .reply
                        .send(format!("Added {} tracks to the queue", admitted.len()));
                }
                if rejected > 0 {
                    event.reply.send("Max queue length reached");
                }
            }
        }
    }

    fn list(&self, event: &AppEvent) {
        let titles: Vec<String> = self
            .queue
            .snapshot()
            .iter()
            .map(|track| track.info.title.clone())
            .collect();
        if titles.is_empty() {
            event.reply.send("Queue is empty");
            return;
        }
        event
            .reply
            .send(render_list(&titles, self.deps.config.player.list_display));
    }
}

/// Rows are one-based with the playing track first and marked; at most
/// `display` rows, the remainder condensed into a trailing count.
fn render_list(titles: &[String], display: usize) -> String {
    let shown = titles.len().min(display);
    let mut lines: Vec<String> = Vec::with_capacity(shown + 1);
    for (index, title) in titles[..shown].iter().enumerate() {
        let marker = if index == 0 { " <--" } else { "" };
        lines.push(format!("{} - {}{}", index + 1, title, marker));
    }
    if titles.len() > shown {
        lines.push(format!("...and {} more tracks", titles.len() - shown));
    }
    lines.join("\n")
}

#[async_trait]
impl VoiceApp for QueuePlayer {
    fn kind(&self) -> AppKind {
        AppKind::Player
    }

    async fn handle_event(&self, event: AppEvent) -> Result<(), AppError> {
        match event.name.as_str() {
            "queue" => {
                self.enqueue(&event).await;
                Ok(())
            }
            "list" => {
                self.list(&event);
                Ok(())
            }
            "next" => {
                // A parked track only sees the skip once it is awake.
                self.container.request_resume().await;
                let skipped = send_within(&self.next_tx, ()).await;
                event.reply.send(if skipped { "Skipped" } else { "Nothing is playing" });
                Ok(())
            }
            "pause" => {
                let paused = self.container.bus().request_pause().await;
                event.reply.send(if paused { "Paused" } else { "Nothing is playing" });
                Ok(())
            }
            "resume" => {
                let resumed = self.container.request_resume().await;
                event.reply.send(if resumed { "Resumed" } else { "Nothing is paused" });
                Ok(())
            }
            "stop" => {
                *self.notices.lock() = event.reply.clone();
                self.container.stop();
                Ok(())
            }
            _ => Err(AppError::UnknownEvent(event.name)),
        }
    }

    async fn run(&self) -> AnyResult<()> {
        debug!("Player workspace is {}", self.workspace_id);
        let downloads = tokio::spawn(run_downloads(
            self.container.clone(),
            self.deps.clone(),
            self.queue.clone(),
            self.workspace.clone(),
        ));
        let playback = tokio::spawn(run_playback(
            self.container.clone(),
            self.deps.clone(),
            self.queue.clone(),
            self.next_rx.clone(),
            self.notices.clone(),
        ));

        let player = &self.deps.config.player;
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut empty_since: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = self.container.cancel_token().cancelled() => break,
                _ = ticker.tick() => {
                    if self.started_at.elapsed() >= player.max_lifetime() {
                        info!("Player hit its lifetime cap, stopping");
                        break;
                    }
                    if self.queue.is_empty() {
                        let since = empty_since.get_or_insert_with(Instant::now);
                        if since.elapsed() >= player.idle_grace() {
                            info!("Queue stayed empty for {}s, stopping", player.idle_grace_secs);
                            break;
                        }
                    } else {
                        empty_since = None;
                    }
                }
            }
        }

        self.container.stop();
        let _ = downloads.await;
        let _ = playback.await;
        if let Err(err) = tokio::fs::remove_dir_all(&self.workspace).await {
            debug!("Workspace cleanup skipped: {}", err);
        }
        self.notices.lock().send("Stopping playing");
        Ok(())
    }
}
