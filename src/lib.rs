//! Hearo - assistive-vision voice client
//!
//! This library provides the core functionality of the Hearo client:
//! - Audio capture and playback
//! - Speech-to-text and text-to-speech provider adapters (with local fallback)
//! - Image upload via brokered signed URLs and vision-language queries
//! - The interaction orchestrator that sequences one voice/vision turn at a time
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  User interaction                    │
//! │   record  │  stop  │  speed control  │  navigate     │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │                    Orchestrator                      │
//! │   turn state machine  │  mic/speaker locks  │ stages │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │  Capture │ STT │ TTS (+fallback) │ Upload │ Vision   │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod server;
pub mod speech;
pub mod vision;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, Stage, TurnId, TurnSnapshot};
pub use speech::{clamp_speed, Origin, Utterance};
