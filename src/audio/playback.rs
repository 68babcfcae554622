//! Audio playback to speakers
//!
//! Playback is blocking (callers use `spawn_blocking`) and observes a shared
//! stop flag so a cancelled turn stops producing sound immediately.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use crate::{Error, Result};

/// Sample rate for playback (matches the synthesis provider's MP3 output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Play MP3 bytes to the default output device
///
/// Returns once the audio finishes or `stop` is set.
///
/// # Errors
///
/// Returns error if decoding or playback fails, or if the payload decodes
/// to no samples at all (an empty or non-MP3 body)
pub fn play_mp3(mp3_data: &[u8], stop: &Arc<AtomicBool>) -> Result<()> {
    let samples = decode_mp3(mp3_data)?;
    if samples.is_empty() {
        return Err(Error::Audio("payload decoded to no audio".to_string()));
    }
    play_samples(samples, stop)
}

/// Play f32 samples to the default output device
///
/// # Errors
///
/// Returns error if the audio device cannot be opened
pub fn play_samples(samples: Vec<f32>, stop: &Arc<AtomicBool>) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = config.channels as usize;

    let sample_count = samples.len();
    let samples = Arc::new(Mutex::new(samples));
    let position = Arc::new(Mutex::new(0usize));
    let finished = Arc::new(AtomicBool::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let samples = samples_cb.lock().unwrap();
                let mut pos = position_cb.lock().unwrap();

                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples.len() {
                        samples[*pos]
                    } else {
                        finished_cb.store(true, Ordering::SeqCst);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if *pos < samples.len() {
                        *pos += 1;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::SeqCst) {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("playback cancelled");
            drop(stream);
            return Ok(());
        }
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    // Small delay to let the device drain
    std::thread::sleep(std::time::Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode MP3 bytes to f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                // Convert i16 samples to f32 and mix stereo down to mono
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            (left + right) / 2.0
                        })
                        .collect()
                } else {
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
