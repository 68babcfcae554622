//! Text-to-speech with automatic local fallback
//!
//! The primary provider is ElevenLabs; any primary failure falls back
//! transparently to a local speech engine. `SynthesisFailed` is raised only
//! when both paths fail.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::audio::play_mp3;
use crate::config::PROVIDER_TIMEOUT;
use crate::speech::{clamp_speed, Utterance};
use crate::{Error, Result};

const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Voice stability setting for the primary provider
const STABILITY: f32 = 0.4;

/// Similarity boost setting for the primary provider
const SIMILARITY_BOOST: f32 = 0.7;

/// Local engine rate range (clamped separately from the provider speed)
const FALLBACK_MIN_RATE: f32 = 0.5;
const FALLBACK_MAX_RATE: f32 = 2.0;

/// Baseline words-per-minute for the local engine at rate 1.0
const FALLBACK_BASE_WPM: f32 = 175.0;

/// Synthesizes and plays an utterance; owns the audible-playback side
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize and play the utterance
    ///
    /// Returns once playback finishes or is cancelled. A primary-provider
    /// failure triggers the local fallback without surfacing an error.
    ///
    /// # Errors
    ///
    /// Returns `SynthesisFailed` only if both the remote provider and the
    /// local fallback fail.
    async fn speak(&self, utterance: &Utterance) -> Result<()>;

    /// Stop any in-progress playback immediately
    fn cancel(&self);
}

/// Local, provider-independent speech engine
#[async_trait]
pub trait FallbackEngine: Send + Sync {
    /// Speak text at the given rate (clamped to [0.5, 2.0])
    ///
    /// # Errors
    ///
    /// Returns `SynthesisFailed` if the engine fails
    async fn speak(&self, text: &str, rate: f32) -> Result<()>;

    /// Stop the engine if it is speaking
    fn cancel(&self);
}

/// Dual-provider speech synthesis client
pub struct SpeechSynthesis {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    voice_id: String,
    model: String,
    fallback: Box<dyn FallbackEngine>,
    stop: Arc<AtomicBool>,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

impl SpeechSynthesis {
    /// Create a new synthesis client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(
        api_key: String,
        voice_id: String,
        model: String,
        fallback: Box<dyn FallbackEngine>,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(PROVIDER_TIMEOUT)
                .build()?,
            endpoint: ELEVENLABS_TTS_URL.to_string(),
            api_key,
            voice_id,
            model,
            fallback,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Override the primary provider endpoint (proxies, tests)
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Fetch and play one utterance through the primary provider
    ///
    /// Any failure here, including an empty payload and playback errors,
    /// routes the utterance to the fallback engine.
    async fn speak_primary(&self, utterance: &Utterance) -> Result<()> {
        let mp3 = self.synthesize_primary(utterance).await?;
        if mp3.is_empty() {
            return Err(Error::SynthesisFailed(
                "primary returned no audio".to_string(),
            ));
        }
        if self.stop.load(Ordering::SeqCst) {
            // Cancelled during the fetch; discard the payload
            return Ok(());
        }

        tracing::debug!(bytes = mp3.len(), "primary synthesis complete, playing");
        let stop = Arc::clone(&self.stop);
        tokio::task::spawn_blocking(move || play_mp3(&mp3, &stop))
            .await
            .map_err(|e| Error::Audio(e.to_string()))?
    }

    /// Fetch the full MP3 payload from the primary provider
    async fn synthesize_primary(&self, utterance: &Utterance) -> Result<Vec<u8>> {
        let request = TtsRequest {
            text: &utterance.text,
            model_id: &self.model,
            voice_settings: VoiceSettings {
                stability: STABILITY,
                similarity_boost: SIMILARITY_BOOST,
                speed: clamp_speed(utterance.speed),
            },
        };

        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, self.voice_id))
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SynthesisFailed(format!(
                "TTS API error {status}: {body}"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for SpeechSynthesis {
    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        if utterance.text.is_empty() {
            return Ok(());
        }

        self.stop.store(false, Ordering::SeqCst);

        let primary_err = match self.speak_primary(utterance).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if self.stop.load(Ordering::SeqCst) {
            // Cancelled; nothing left to say
            return Ok(());
        }

        tracing::warn!(error = %primary_err, "primary synthesis failed, using local fallback");
        self.fallback
            .speak(&utterance.text, utterance.speed)
            .await
            .map_err(|fallback_err| {
                Error::SynthesisFailed(format!(
                    "primary: {primary_err}; fallback: {fallback_err}"
                ))
            })
    }

    fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.fallback.cancel();
    }
}

/// Clamp a rate into the local engine's range
fn clamp_fallback_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(FALLBACK_MIN_RATE, FALLBACK_MAX_RATE)
    } else {
        1.0
    }
}

/// Local fallback engine backed by an espeak-compatible command
///
/// Speaks directly through the device; no intermediate audio file.
pub struct SpeechCommandFallback {
    command: String,
    child: Arc<Mutex<Option<tokio::process::Child>>>,
}

impl SpeechCommandFallback {
    /// Create a fallback engine for the given speech command
    #[must_use]
    pub fn new(command: String) -> Self {
        Self {
            command,
            child: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl FallbackEngine for SpeechCommandFallback {
    async fn speak(&self, text: &str, rate: f32) -> Result<()> {
        let rate = clamp_fallback_rate(rate);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wpm = (FALLBACK_BASE_WPM * rate) as u32;

        let child = tokio::process::Command::new(&self.command)
            .arg("-s")
            .arg(wpm.to_string())
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::SynthesisFailed(format!("failed to spawn {}: {e}", self.command))
            })?;

        tracing::debug!(command = %self.command, wpm, "fallback engine speaking");

        if let Ok(mut slot) = self.child.lock() {
            *slot = Some(child);
        }

        // Poll for exit rather than holding the child across an await;
        // cancel() needs to reach it through the shared slot.
        loop {
            let status = {
                let Ok(mut slot) = self.child.lock() else {
                    return Ok(());
                };
                let Some(running) = slot.as_mut() else {
                    return Ok(());
                };
                running
                    .try_wait()
                    .map_err(|e| Error::SynthesisFailed(e.to_string()))?
            };

            if let Some(status) = status {
                if let Ok(mut slot) = self.child.lock() {
                    slot.take();
                }
                if status.success() {
                    return Ok(());
                }
                return Err(Error::SynthesisFailed(format!(
                    "{} exited with {status}",
                    self.command
                )));
            }

            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    fn cancel(&self) {
        if let Ok(mut slot) = self.child.lock() {
            if let Some(child) = slot.as_mut() {
                if let Err(e) = child.start_kill() {
                    tracing::debug!(error = %e, "fallback engine already stopped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_rate_clamps_separately() {
        assert_eq!(clamp_fallback_rate(0.1), FALLBACK_MIN_RATE);
        assert_eq!(clamp_fallback_rate(5.0), FALLBACK_MAX_RATE);
        assert_eq!(clamp_fallback_rate(1.2), 1.2);
        assert_eq!(clamp_fallback_rate(f32::NAN), 1.0);
    }

    #[test]
    fn tts_request_shape() {
        let request = TtsRequest {
            text: "hello",
            model_id: "eleven_turbo_v2",
            voice_settings: VoiceSettings {
                stability: STABILITY,
                similarity_boost: SIMILARITY_BOOST,
                speed: 1.0,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["model_id"], "eleven_turbo_v2");
        assert!((json["voice_settings"]["stability"].as_f64().unwrap() - 0.4).abs() < 1e-6);
        assert!(
            (json["voice_settings"]["similarity_boost"].as_f64().unwrap() - 0.7).abs() < 1e-6
        );
    }
}
