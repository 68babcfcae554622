//! Speech processing: transcription and synthesis
//!
//! Providers sit behind the [`Transcriber`] and [`Synthesizer`] traits so the
//! orchestrator is written against the capability, not a concrete backend.

mod stt;
mod tts;

pub use stt::{ElevenLabsStt, Transcriber};
pub use tts::{FallbackEngine, SpeechCommandFallback, SpeechSynthesis, Synthesizer};

/// Minimum playback speed (linear factor)
pub const MIN_SPEED: f32 = 0.7;

/// Maximum playback speed (linear factor)
pub const MAX_SPEED: f32 = 1.2;

/// Where a piece of spoken text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Transcribed from the user's voice
    UserSpeech,
    /// Produced by the vision-language model
    ModelAnswer,
    /// Generated by the client itself (prompts, apologies, speed notices)
    SystemAnnouncement,
}

/// Text plus voice parameters intended for audible playback
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub origin: Origin,
    /// Playback speed, always within [`MIN_SPEED`, `MAX_SPEED`]
    pub speed: f32,
}

impl Utterance {
    /// Build an utterance, clamping the speed into range
    pub fn new(text: impl Into<String>, origin: Origin, speed: f32) -> Self {
        Self {
            text: text.into(),
            origin,
            speed: clamp_speed(speed),
        }
    }
}

/// Clamp a playback speed into [0.7, 1.2]
///
/// Out-of-range values are clamped, not rejected; non-finite input falls
/// back to the natural rate.
#[must_use]
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}
