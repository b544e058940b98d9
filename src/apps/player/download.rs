use std::path::PathBuf;
use std::sync::Arc;

use crate::apps::AppDeps;
use crate::session::Container;

use super::queue::TrackQueue;

/// Pulls queued tracks off the pending channel, fetches their audio into
/// the workspace and hands them to playback over the ready channel. The
/// ready channel blocks when playback falls behind, which is the only
/// throttle on how much gets downloaded ahead of time.
pub(super) async fn run_downloads(
    container: Arc<Container>,
    deps: Arc<AppDeps>,
    queue: Arc<TrackQueue>,
    workspace: PathBuf,
) {
    let pending = queue.pending();
    let ready = queue.ready_sender();
    loop {
        let track = tokio::select! {
            _ = container.cancel_token().cancelled() => break,
            track = pending.recv_async() => match track {
                Ok(track) => track,
                Err(_) => break,
            },
        };
        if track.is_dropped() {
            continue;
        }
        // The first queue event can land before the run task does.
        let _ = tokio::fs::create_dir_all(&workspace).await;
        let fetched = tokio::select! {
            _ = container.cancel_token().cancelled() => break,
            fetched = deps.sources.fetch(&track.info, &workspace) => fetched,
        };
        match fetched {
            Ok(payload) => {
                track.set_payload(payload);
                tokio::select! {
                    _ = container.cancel_token().cancelled() => break,
                    sent = ready.send_async(track.clone()) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!("Failed to download {}: {}", track.info.title, err);
                queue.drop_track(&track);
            }
        }
    }
}
