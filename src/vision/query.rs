//! Vision-language model client
//!
//! Sends one image reference and one natural-language prompt to Gemini and
//! returns the answer text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PROVIDER_TIMEOUT;
use crate::vision::{guess_mime, ImageReference};
use crate::{Error, Result};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Fixed scene-description prompt used when the user asks nothing specific
const SCENE_PROMPT: &str = "Speak directly to them, using phrases like 'you are seeing\u{2026}' or 'in front of you\u{2026}'. Summarize the scene concisely, focusing on the most important objects, people, and actions. Avoid unnecessary details, colors, or technical jargon. Make the description clear and easy to imagine, keeping it short and to the point. If there is text, describe the general gist of the text. If there are any outstanding signs, briefly say the title/description of the sign as well.";

/// Answers natural-language questions about an uploaded image
#[async_trait]
pub trait VisionQuerier: Send + Sync {
    /// Query the model with an image reference and a prompt
    ///
    /// An empty prompt falls back to the fixed scene-description prompt.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisFailed` on provider or network failure
    async fn query(&self, image: &ImageReference, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    #[serde(rename = "fileData")]
    FileData {
        #[serde(rename = "fileUri")]
        file_uri: &'a str,
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
    },
    #[serde(rename = "text")]
    Text(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini vision client
pub struct GeminiVision {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiVision {
    /// Create a new vision client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Google API key required for vision".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(PROVIDER_TIMEOUT)
                .build()?,
            api_key,
            model,
        })
    }
}

/// Build the model prompt from the user's question
///
/// A non-empty question is wrapped in the blind-user framing; an empty one
/// falls back to the fixed scene prompt.
fn build_prompt(question: &str) -> String {
    let question = question.trim();
    if question.is_empty() {
        SCENE_PROMPT.to_string()
    } else {
        format!(
            "You are describing what is in front of a blind person. Speak directly to them, \
             using phrases like 'you are seeing\u{2026}' or 'in front of you\u{2026}'. \n \
             Answer the following question they have about the scene: \"{question}\". \
             Avoid unnecessary details, colors, or technical jargon. Make the answer clear \
             and easy to understand, keeping it short and to the point."
        )
    }
}

#[async_trait]
impl VisionQuerier for GeminiVision {
    async fn query(&self, image: &ImageReference, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::FileData {
                        file_uri: &image.gs_uri,
                        mime_type: guess_mime(&image.gs_uri),
                    },
                    Part::Text(build_prompt(prompt)),
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 1.0,
                top_p: 0.87,
            },
        };

        tracing::debug!(image = %image.gs_uri, model = %self.model, "querying vision model");

        let response = self
            .client
            .post(format!(
                "{GEMINI_API_URL}/{}:generateContent",
                self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::AnalysisFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "vision API error");
            return Err(Error::AnalysisFailed(format!(
                "vision API error {status}: {body}"
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::AnalysisFailed(format!("malformed vision response: {e}")))?;

        let answer: String = result
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(Error::AnalysisFailed(
                "vision response contained no text".to_string(),
            ));
        }

        tracing::info!(chars = answer.len(), "vision answer received");
        Ok(answer)
    }
}
