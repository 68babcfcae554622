//! Configuration management for the Hearo client

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default playback speed (linear factor, 1.0 = natural rate)
pub const DEFAULT_SPEED: f32 = 1.0;

/// Timeout for transcription, synthesis, and vision calls
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for image upload (issuing call and byte transfer each)
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Hearo client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (cached photos, recordings)
    pub data_dir: PathBuf,

    /// Voice configuration (STT/TTS providers)
    pub voice: VoiceConfig,

    /// Vision configuration (upload broker + model)
    pub vision: VisionConfig,

    /// Signed-URL issuing service configuration
    pub server: ServerConfig,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// ElevenLabs API key (STT and TTS)
    pub elevenlabs_api_key: Option<String>,

    /// STT model (e.g. "scribe_v1")
    pub stt_model: String,

    /// Language hint for transcription
    pub language: String,

    /// TTS model (e.g. "eleven_turbo_v2")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// Playback speed, clamped to [0.7, 1.2] at the point of use
    pub speed: f32,

    /// Local fallback speech command (espeak-compatible)
    pub fallback_command: String,
}

/// Vision configuration
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Base URL of the signed-URL issuing service
    pub backend_url: String,

    /// Google API key for the vision model
    pub google_api_key: Option<String>,

    /// Vision model identifier
    pub model: String,
}

/// Signed-URL issuing service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// GCS bucket name for uploads
    pub bucket: String,

    /// HMAC access key id (GCS interoperability credential)
    pub hmac_access_id: Option<String>,

    /// HMAC secret
    pub hmac_secret: Option<String>,

    /// Upload-target expiry in seconds (15 minutes)
    pub upload_expiry_secs: u64,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if a present variable fails to parse
    pub fn load() -> Result<Self> {
        let data_dir = directories::ProjectDirs::from("app", "hearo", "hearo")
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf());
        std::fs::create_dir_all(&data_dir).ok();

        let speed = match std::env::var("HEARO_TTS_SPEED") {
            Ok(s) => s
                .parse::<f32>()
                .map_err(|e| Error::Config(format!("invalid HEARO_TTS_SPEED: {e}")))?,
            Err(_) => DEFAULT_SPEED,
        };

        let voice = VoiceConfig {
            elevenlabs_api_key: std::env::var("ELEVENLABS_API_KEY").ok(),
            stt_model: std::env::var("HEARO_STT_MODEL")
                .unwrap_or_else(|_| "scribe_v1".to_string()),
            language: std::env::var("HEARO_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            tts_model: std::env::var("HEARO_TTS_MODEL")
                .unwrap_or_else(|_| "eleven_turbo_v2".to_string()),
            tts_voice: std::env::var("HEARO_TTS_VOICE")
                .unwrap_or_else(|_| "iP95p4xoKVk53GoZ742B".to_string()),
            speed,
            fallback_command: std::env::var("HEARO_FALLBACK_TTS")
                .unwrap_or_else(|_| "espeak".to_string()),
        };

        let vision = VisionConfig {
            backend_url: std::env::var("HEARO_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
            model: std::env::var("HEARO_VISION_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
        };

        let server = ServerConfig {
            port: std::env::var("HEARO_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            bucket: std::env::var("GCS_BUCKET_NAME").unwrap_or_default(),
            hmac_access_id: std::env::var("GCS_HMAC_ACCESS_ID").ok(),
            hmac_secret: std::env::var("GCS_HMAC_SECRET").ok(),
            upload_expiry_secs: 15 * 60,
        };

        Ok(Self {
            data_dir,
            voice,
            vision,
            server,
        })
    }

    /// The ElevenLabs API key, or a configuration error naming the variable
    ///
    /// # Errors
    ///
    /// Returns error if the key is not set
    pub fn require_elevenlabs_key(&self) -> Result<&str> {
        self.voice
            .elevenlabs_api_key
            .as_deref()
            .ok_or_else(|| Error::Config("ELEVENLABS_API_KEY not set".to_string()))
    }
}
