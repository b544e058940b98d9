//! Shared speech playback: synthesize a line, claim the output and stream
//! it at frame rate.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::common::AnyResult;
use crate::session::Container;
use crate::speech::SpeechStack;
use crate::voice::{FRAME_MILLIS, FRAME_SAMPLES};

/// Speaks `text` through the container's output. Honors pause requests by
/// parking mid-utterance and continuing where it left off after a resume.
/// Returns without speaking when the app is cancelled first.
pub(crate) async fn speak(
    container: &Container,
    speech: &SpeechStack,
    voice: &str,
    text: &str,
) -> AnyResult<()> {
    let samples = speech.tts.synthesize(text, voice).await?;
    if samples.is_empty() {
        return Ok(());
    }

    let Some(mut grant) = container.acquire().await else {
        return Ok(());
    };

    let pause_rx = container.pause_signals();
    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MILLIS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let mut chunks = samples.chunks(FRAME_SAMPLES);
    let mut padded = [0i16; FRAME_SAMPLES];
    loop {
        tokio::select! {
            _ = container.cancel_token().cancelled() => break,
            signal = pause_rx.recv_async() => {
                if signal.is_err() {
                    break;
                }
                match container.wait_for_resume(grant).await {
                    Some(next) => grant = next,
                    // Cancelled while parked; the output is already free.
                    None => return Ok(()),
                }
            }
            _ = ticker.tick() => {
                let Some(chunk) = chunks.next() else {
                    break;
                };
                let frame: &[i16] = if chunk.len() == FRAME_SAMPLES {
                    chunk
                } else {
                    padded[..chunk.len()].copy_from_slice(chunk);
                    padded[chunk.len()..].fill(0);
                    &padded
                };
                if let Err(err) = container.channel().send_frame(frame).await {
                    debug!("Dropping utterance mid-stream: {}", err);
                    break;
                }
            }
        }
    }

    container.release(grant).await;
    Ok(())
}
