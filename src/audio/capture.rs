//! Audio capture from microphone
//!
//! The cpal input stream is not `Send`, so the stream lives on a dedicated
//! capture thread; the session owns a shared sample buffer and a stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// A finished audio clip, ready for transcription
///
/// Moved (by value) from the capture session into the transcription client;
/// the session keeps no reference to it.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Encoded WAV bytes
    pub wav: Vec<u8>,
    /// Format tag sent to the transcription provider
    pub format: &'static str,
    /// When capture stopped
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Captured audio duration
    pub duration: Duration,
}

/// Exclusive microphone session
///
/// Callers must pair every `start` with a `stop`; a second `start` without
/// an intervening `stop` is a caller bug and fails with `DeviceBusy`.
pub trait CaptureSession: Send {
    /// Check whether microphone access is available/granted
    fn request_permission(&mut self) -> bool;

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if no input device is available, or
    /// `DeviceBusy` if a previous session was not torn down.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and return the finished recording
    ///
    /// Returns `None` if nothing was captured (zero-duration stop).
    fn stop(&mut self) -> Option<Recording>;
}

/// Captures audio from the default input device on a dedicated thread
pub struct MicCapture {
    buffer: Arc<Mutex<Vec<f32>>>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl MicCapture {
    /// Create a new microphone capture session
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn input_device_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }
}

impl Default for MicCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession for MicCapture {
    fn request_permission(&mut self) -> bool {
        let granted = Self::input_device_available();
        if !granted {
            tracing::warn!("no input device available, microphone access denied");
        }
        granted
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::DeviceBusy("capture session already started"));
        }
        if !Self::input_device_available() {
            return Err(Error::PermissionDenied("microphone access not granted"));
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        self.stop.store(false, Ordering::SeqCst);

        let buffer = Arc::clone(&self.buffer);
        let stop = Arc::clone(&self.stop);

        let worker = std::thread::spawn(move || {
            if let Err(e) = capture_loop(&buffer, &stop) {
                tracing::error!(error = %e, "audio capture failed");
            }
        });
        self.worker = Some(worker);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) -> Option<Recording> {
        let worker = self.worker.take()?;
        self.stop.store(true, Ordering::SeqCst);
        if worker.join().is_err() {
            tracing::error!("capture thread panicked");
        }

        let samples = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        if samples.is_empty() {
            tracing::debug!("capture stopped with no audio");
            return None;
        }

        let duration =
            Duration::from_secs_f64(f64::from(u32::try_from(samples.len()).unwrap_or(u32::MAX)) / f64::from(SAMPLE_RATE));

        match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => {
                tracing::debug!(samples = samples.len(), "capture stopped");
                Some(Recording {
                    wav,
                    format: "audio/wav",
                    created_at: chrono::Utc::now(),
                    duration,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "WAV encoding failed");
                None
            }
        }
    }
}

/// Run the cpal input stream until the stop flag is set
fn capture_loop(buffer: &Arc<Mutex<Vec<f32>>>, stop: &Arc<AtomicBool>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio capture initialized"
    );

    let shared = Arc::clone(buffer);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = shared.lock() {
                    buf.extend_from_slice(data);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    Ok(())
}

/// Convert f32 samples to WAV bytes for the transcription provider
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
