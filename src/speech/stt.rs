//! Speech-to-text provider adapter

use async_trait::async_trait;

use crate::audio::Recording;
use crate::config::PROVIDER_TIMEOUT;
use crate::{Error, Result};

const ELEVENLABS_STT_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text";

/// Transcribes a finished recording to text
///
/// An empty transcript is a valid success ("no speech detected"), never an
/// error; callers decide what an empty result means.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a recording, consuming it
    ///
    /// # Errors
    ///
    /// Returns `TranscriptionFailed` on provider or network failure
    async fn transcribe(&self, recording: Recording) -> Result<String>;
}

/// ElevenLabs scribe transcription client
pub struct ElevenLabsStt {
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: String,
}

impl ElevenLabsStt {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String, language: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for STT".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(PROVIDER_TIMEOUT)
                .build()?,
            api_key,
            model,
            language,
        })
    }
}

#[async_trait]
impl Transcriber for ElevenLabsStt {
    async fn transcribe(&self, recording: Recording) -> Result<String> {
        tracing::debug!(
            audio_bytes = recording.wav.len(),
            duration_ms = recording.duration.as_millis(),
            "starting transcription"
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(recording.wav)
                    .file_name("recording.wav")
                    .mime_str(recording.format)
                    .map_err(|e| Error::TranscriptionFailed(e.to_string()))?,
            )
            .text("model_id", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(ELEVENLABS_STT_URL)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::TranscriptionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::TranscriptionFailed(format!(
                "STT API error {status}: {body}"
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::TranscriptionFailed(e.to_string()))?;

        let transcript = extract_transcript(&value);
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

/// Pull the transcript out of a provider response
///
/// Provider schemas drift; the transcript has been observed under `text`,
/// `transcript`, and `results[0].alternatives[0].transcript`. A response with
/// none of these yields an empty transcript (valid: no speech detected).
fn extract_transcript(value: &serde_json::Value) -> String {
    if let Some(text) = value.get("text").and_then(|v| v.as_str()) {
        return text.to_string();
    }
    if let Some(text) = value.get("transcript").and_then(|v| v.as_str()) {
        return text.to_string();
    }
    if let Some(text) = value
        .pointer("/results/0/alternatives/0/transcript")
        .and_then(|v| v.as_str())
    {
        return text.to_string();
    }
    if let Some(text) = value.as_str() {
        return text.to_string();
    }

    tracing::warn!(?value, "no transcript field in STT response");
    String::new()
}
