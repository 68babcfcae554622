//! Error types for the Hearo client

use thiserror::Error;

/// Result type alias for Hearo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Hearo client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone (or storage) access was refused by the user
    ///
    /// Always user-visible and immediately actionable.
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    /// A capture session was started without tearing down the previous one
    ///
    /// Indicates a caller bug; fatal to the turn, never shown to the user.
    #[error("device busy: {0}")]
    DeviceBusy(&'static str),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text provider failure
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Both the remote synthesis provider and the local fallback failed
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Image upload failure (issuing service or byte transfer)
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Vision-language model failure
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    /// The turn was superseded or abandoned; a normal termination, not a failure
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
