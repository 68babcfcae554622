//! Audio capture and playback
//!
//! Capture produces a finished WAV [`Recording`]; playback is cancellable
//! via a shared stop flag so a superseded turn can be silenced mid-speech.

mod capture;
mod playback;

pub use capture::{CaptureSession, MicCapture, Recording, samples_to_wav, SAMPLE_RATE};
pub use playback::{play_mp3, play_samples};
