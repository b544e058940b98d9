//! Decodes a media file into channel-rate mono PCM frames.
//!
//! Decoding is CPU-bound and symphonia's reader is blocking, so each
//! stream runs on its own thread and feeds a bounded channel. Dropping
//! the receiver is how playback stops a stream early.

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::audio::MonoResampler;
use crate::sources::MediaError;
use crate::voice::{FRAME_SAMPLES, SAMPLE_RATE};

/// Frames buffered between the decode thread and the frame loop.
const STREAM_DEPTH: usize = 64;

/// Probes `path` and starts a decode thread producing frames of exactly
/// [`FRAME_SAMPLES`] mono samples at [`SAMPLE_RATE`]. The final frame is
/// zero-padded.
pub fn stream_file(path: &Path) -> Result<flume::Receiver<Vec<i16>>, MediaError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(&ext.to_lowercase());
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| MediaError::Unsupported(err.to_string()))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::Unsupported("no audio track found".to_string()))?;

    let track_id = track.id;
    let source_rate = track.codec_params.sample_rate.unwrap_or(SAMPLE_RATE);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| MediaError::Unsupported(err.to_string()))?;

    debug!(
        "Decoding {} ({}Hz, {} channel(s))",
        path.display(),
        source_rate,
        channels
    );

    let (tx, rx) = flume::bounded(STREAM_DEPTH);
    std::thread::spawn(move || {
        decode_into(format, decoder, track_id, source_rate, channels, tx);
    });
    Ok(rx)
}

fn decode_into(
    mut format: Box<dyn FormatReader>,
    mut decoder: Box<dyn Decoder>,
    track_id: u32,
    source_rate: u32,
    channels: usize,
    tx: flume::Sender<Vec<i16>>,
) {
    let mut resampler = MonoResampler::new(source_rate, SAMPLE_RATE);
    let mut sample_buf: Option<SampleBuffer<i16>> = None;
    let mut mono = Vec::new();
    let mut resampled = Vec::new();
    let mut frame = Vec::with_capacity(FRAME_SAMPLES);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(Error::DecodeError(err)) => {
                debug!("decode error: {}", err);
                continue;
            }
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(Error::DecodeError(err)) => {
                debug!("decode error: {}", err);
                continue;
            }
            Err(_) => break,
        };

        let spec = *audio_buf.spec();
        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<i16>::new(audio_buf.capacity() as u64, spec)
        });
        buf.copy_interleaved_ref(audio_buf);
        downmix(buf.samples(), channels, &mut mono);

        let samples: &[i16] = if resampler.is_passthrough() {
            &mono
        } else {
            resampled.clear();
            resampler.process(&mono, &mut resampled);
            &resampled
        };

        for &sample in samples {
            frame.push(sample);
            if frame.len() == FRAME_SAMPLES {
                let full = std::mem::replace(&mut frame, Vec::with_capacity(FRAME_SAMPLES));
                if tx.send(full).is_err() {
                    return;
                }
            }
        }
    }

    if !frame.is_empty() {
        frame.resize(FRAME_SAMPLES, 0);
        let _ = tx.send(frame);
    }
}

/// Averages interleaved samples down to one channel.
fn downmix(samples: &[i16], channels: usize, mono: &mut Vec<i16>) {
    mono.clear();
    if channels <= 1 {
        mono.extend_from_slice(samples);
        return;
    }
    for group in samples.chunks_exact(channels) {
        let sum: i32 = group.iter().map(|&s| i32::from(s)).sum();
        mono.push((sum / channels as i32) as i16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    fn collect_frames(rx: flume::Receiver<Vec<i16>>) -> Vec<Vec<i16>> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.recv_timeout(std::time::Duration::from_secs(5)) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn mono_wav_streams_in_exact_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        // 2.5 frames of a constant signal.
        write_wav(&path, SAMPLE_RATE, 1, &vec![700i16; FRAME_SAMPLES * 2 + 480]);

        let frames = collect_frames(stream_file(&path).unwrap());
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == FRAME_SAMPLES));
        assert_eq!(frames[0][0], 700);
        // The tail frame is padded with silence.
        assert_eq!(frames[2][FRAME_SAMPLES - 1], 0);
    }

    #[test]
    fn stereo_wav_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let mut samples = Vec::new();
        for _ in 0..FRAME_SAMPLES {
            samples.push(100i16);
            samples.push(300i16);
        }
        write_wav(&path, SAMPLE_RATE, 2, &samples);

        let frames = collect_frames(stream_file(&path).unwrap());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][10], 200);
    }

    #[test]
    fn garbage_files_are_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, [0x13u8; 256]).unwrap();
        assert!(matches!(
            stream_file(&path),
            Err(MediaError::Unsupported(_))
        ));
    }
}
