use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::apps::{AppDeps, ReplySink};
use crate::configs::PlayerConfig;
use crate::session::Container;
use crate::voice::FRAME_MILLIS;

use super::queue::TrackQueue;

enum PlayEnd {
    Done,
    Cancelled,
}

/// Streams one decoded track to the voice channel at frame cadence.
///
/// Holds the output for the whole track, parking on pause signals and
/// skipping forward when a "next" arrives. A decode stream that stalls
/// longer than `no_data_timeout` counts as finished.
async fn stream_track(
    container: &Container,
    frames: &flume::Receiver<Vec<i16>>,
    next_rx: &flume::Receiver<()>,
    no_data_timeout: Duration,
) -> PlayEnd {
    let Some(mut grant) = container.acquire().await else {
        return PlayEnd::Cancelled;
    };
    let pause_rx = container.pause_signals();
    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MILLIS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
    let mut starved_since: Option<Instant> = None;

    let end = loop {
        tokio::select! {
            _ = container.cancel_token().cancelled() => break PlayEnd::Cancelled,
            signal = pause_rx.recv_async() => {
                if signal.is_err() {
                    break PlayEnd::Cancelled;
                }
                match container.wait_for_resume(grant).await {
                    Some(next) => {
                        grant = next;
                        starved_since = None;
                    }
                    // Cancelled while parked, nothing left to release.
                    None => return PlayEnd::Cancelled,
                }
            }
            signal = next_rx.recv_async() => {
                if signal.is_ok() {
                    break PlayEnd::Done;
                }
            }
            _ = ticker.tick() => {
                match frames.try_recv() {
                    Ok(frame) => {
                        starved_since = None;
                        if container.channel().send_frame(&frame).await.is_err() {
                            break PlayEnd::Done;
                        }
                    }
                    Err(flume::TryRecvError::Empty) => {
                        let since = starved_since.get_or_insert_with(Instant::now);
                        if since.elapsed() >= no_data_timeout {
                            tracing::debug!("Decode stream stalled, ending track");
                            break PlayEnd::Done;
                        }
                    }
                    Err(flume::TryRecvError::Disconnected) => break PlayEnd::Done,
                }
            }
        }
    };
    container.release(grant).await;
    end
}

/// Plays tracks off the ready channel until the session is stopped.
pub(super) async fn run_playback(
    container: Arc<Container>,
    deps: Arc<AppDeps>,
    queue: Arc<TrackQueue>,
    next_rx: flume::Receiver<()>,
    notices: Arc<parking_lot::Mutex<ReplySink>>,
) {
    let player: &PlayerConfig = &deps.config.player;
    let ready = queue.ready();
    loop {
        let track = tokio::select! {
            _ = container.cancel_token().cancelled() => break,
            track = ready.recv_async() => match track {
                Ok(track) => track,
                Err(_) => break,
            },
        };
        if track.is_dropped() {
            if let Some(payload) = track.payload() {
                payload.discard();
            }
            continue;
        }
        let Some(payload) = track.payload() else {
            // Download task only queues tracks after the payload is set.
            continue;
        };
        let frames = match payload.open_stream() {
            Ok(frames) => frames,
            Err(err) => {
                tracing::warn!("Cannot decode {}: {}", track.info.title, err);
                notices
                    .lock()
                    .send(format!("Failed to play [ {} ], skipping", track.info.title));
                queue.drop_track(&track);
                payload.discard();
                continue;
            }
        };
        notices
            .lock()
            .send(format!("Playing track [ {} ]", track.info.title));
        tracing::info!("Playing {} from {}", track.info.title, track.info.source);

        let end = stream_track(&container, &frames, &next_rx, player.no_data_timeout()).await;
        queue.pop_played(&track);
        payload.discard();
        if matches!(end, PlayEnd::Cancelled) {
            break;
        }
    }
}
