//! Scripted provider implementations for orchestrator tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hearo::audio::{CaptureSession, Recording};
use hearo::orchestrator::{Clients, Orchestrator, Stage, TurnId, TurnSnapshot};
use hearo::speech::{Synthesizer, Transcriber, Utterance};
use hearo::vision::{ImageReference, ImageUploader, Photo, VisionQuerier};
use hearo::{Error, Result};
use tokio::sync::broadcast;

pub fn make_recording() -> Recording {
    Recording {
        wav: vec![0u8; 256],
        format: "audio/wav",
        created_at: chrono::Utc::now(),
        duration: Duration::from_secs(1),
    }
}

/// Capture session that produces a canned recording
pub struct ScriptedCapture {
    pub permission: bool,
    pub has_audio: bool,
    started: bool,
    pub starts: Arc<AtomicUsize>,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self {
            permission: true,
            has_audio: true,
            started: false,
            starts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without_permission() -> Self {
        Self {
            permission: false,
            ..Self::new()
        }
    }

    pub fn silent() -> Self {
        Self {
            has_audio: false,
            ..Self::new()
        }
    }
}

impl CaptureSession for ScriptedCapture {
    fn request_permission(&mut self) -> bool {
        self.permission
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::DeviceBusy("capture session already started"));
        }
        self.started = true;
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Option<Recording> {
        if !self.started {
            return None;
        }
        self.started = false;
        self.has_audio.then(make_recording)
    }
}

/// Transcriber returning fixed text; the first call can be slowed down to
/// leave a window for supersession
pub struct StubTranscriber {
    pub text: String,
    pub first_delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl StubTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            first_delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow_first(text: &str, delay: Duration) -> Self {
        Self {
            first_delay: delay,
            ..Self::new(text)
        }
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _recording: Recording) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 && !self.first_delay.is_zero() {
            tokio::time::sleep(self.first_delay).await;
        }
        Ok(self.text.clone())
    }
}

pub struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _recording: Recording) -> Result<String> {
        Err(Error::TranscriptionFailed("scripted failure".to_string()))
    }
}

/// Synthesizer that records what it was asked to speak
#[derive(Default)]
pub struct RecordingSynth {
    pub spoken: Arc<Mutex<Vec<Utterance>>>,
    pub cancels: Arc<AtomicUsize>,
}

impl RecordingSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynth {
    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        self.spoken.lock().unwrap().push(utterance.clone());
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Synthesizer that keeps speaking until cancelled
#[derive(Default)]
pub struct HangingSynth {
    pub cancelled: Arc<AtomicBool>,
}

impl HangingSynth {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Synthesizer for HangingSynth {
    async fn speak(&self, _utterance: &Utterance) -> Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !self.cancelled.load(Ordering::SeqCst) {
            if tokio::time::Instant::now() > deadline {
                return Err(Error::SynthesisFailed("never cancelled".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Uploader returning a fixed reference
pub struct StubUploader {
    pub calls: Arc<AtomicUsize>,
}

impl StubUploader {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ImageUploader for StubUploader {
    async fn upload(&self, _photo: &Photo) -> Result<ImageReference> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageReference {
            gs_uri: "gs://test-bucket/uploads/1-photo.jpg".to_string(),
            https_url: "https://storage.googleapis.com/test-bucket/uploads/1-photo.jpg"
                .to_string(),
        })
    }
}

pub struct FailingUploader;

#[async_trait]
impl ImageUploader for FailingUploader {
    async fn upload(&self, _photo: &Photo) -> Result<ImageReference> {
        Err(Error::UploadFailed("storage error 500".to_string()))
    }
}

/// Vision model returning a fixed answer
pub struct StubVision {
    pub answer: String,
}

impl StubVision {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl VisionQuerier for StubVision {
    async fn query(&self, _image: &ImageReference, _prompt: &str) -> Result<String> {
        Ok(self.answer.clone())
    }
}

/// Assemble an orchestrator over scripted providers
pub fn orchestrator(
    capture: ScriptedCapture,
    transcriber: Arc<impl Transcriber + 'static>,
    synthesizer: Arc<impl Synthesizer + 'static>,
    uploader: Arc<impl ImageUploader + 'static>,
    vision: Arc<impl VisionQuerier + 'static>,
) -> Orchestrator {
    Orchestrator::new(
        Box::new(capture),
        Clients {
            transcriber,
            synthesizer,
            uploader,
            vision,
        },
        1.0,
    )
}

/// Collect snapshots until the given turn comes to rest
pub async fn collect_until_rest(
    rx: &mut broadcast::Receiver<TurnSnapshot>,
    turn: TurnId,
) -> Vec<TurnSnapshot> {
    let mut seen = Vec::new();
    loop {
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for turn to finish")
            .expect("snapshot channel closed");
        seen.push(snapshot);
        if snapshot.turn == turn && snapshot.stage == Stage::Idle {
            return seen;
        }
    }
}

/// The stage sequence one turn went through
pub fn stages_for(snapshots: &[TurnSnapshot], turn: TurnId) -> Vec<Stage> {
    snapshots
        .iter()
        .filter(|s| s.turn == turn)
        .map(|s| s.stage)
        .collect()
}
