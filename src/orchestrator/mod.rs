//! Voice turn orchestration
//!
//! Drives the capture -> transcribe -> upload -> analyze -> speak pipeline as
//! a single-active-turn state machine. Starting a new turn cancels whatever
//! is in flight, releases the cancelled turn's device locks synchronously,
//! and every asynchronous continuation re-checks its turn id before touching
//! shared state, so a superseded turn can finish quietly without corrupting
//! its successor.

mod locks;
mod turn;

pub use locks::{Resource, ResourceLocks};
pub use turn::{Stage, TurnId, TurnSnapshot};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::audio::{CaptureSession, Recording};
use crate::speech::{
    clamp_speed, Origin, Synthesizer, Transcriber, Utterance, MAX_SPEED, MIN_SPEED,
};
use crate::vision::{ImageReference, ImageUploader, Photo, VisionQuerier};
use crate::{Error, Result};

/// Spoken when a turn dies on a provider failure
const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// Rotating pool of example questions offered when the user asks for a prompt
const QUESTION_PROMPTS: &[&str] = &[
    "What is in front of me?",
    "Is there any text I should know about?",
    "What obstacles are in my way?",
    "Are there any people nearby?",
    "What does this sign say?",
];

/// Snapshot channel depth; stages are small and consumers drain quickly
const SNAPSHOT_BUFFER: usize = 64;

/// Provider clients the orchestrator drives
///
/// Everything sits behind a trait so tests can substitute scripted providers.
pub struct Clients {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub uploader: Arc<dyn ImageUploader>,
    pub vision: Arc<dyn VisionQuerier>,
}

/// The captured photo plus its upload result, cached across voice turns
struct PhotoState {
    photo: Photo,
    uploaded: Option<ImageReference>,
}

struct Inner {
    clients: Clients,
    locks: ResourceLocks,
    /// Active turn id, 0 when idle
    active: AtomicU64,
    /// Next turn id to hand out; starts at 1 so 0 can mean "none"
    next_id: AtomicU64,
    snapshots: broadcast::Sender<TurnSnapshot>,
    current: Mutex<TurnSnapshot>,
    capture: Mutex<Box<dyn CaptureSession>>,
    photo: Mutex<Option<PhotoState>>,
    speed: Mutex<f32>,
    prompt_cursor: AtomicUsize,
}

impl Inner {
    fn alloc_id(&self) -> TurnId {
        TurnId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn still_active(&self, id: TurnId) -> bool {
        self.active.load(Ordering::SeqCst) == id.0
    }

    fn speed(&self) -> f32 {
        self.speed.lock().map(|s| *s).unwrap_or(1.0)
    }

    fn publish(&self, snapshot: TurnSnapshot) {
        tracing::debug!(turn = %snapshot.turn, stage = ?snapshot.stage, "stage transition");
        if let Ok(mut current) = self.current.lock() {
            *current = snapshot;
        }
        let _ = self.snapshots.send(snapshot);
    }

    /// Publish a stage only if the turn is still the active one
    fn publish_for(&self, id: TurnId, stage: Stage) {
        if self.still_active(id) {
            self.publish(TurnSnapshot { turn: id, stage });
        }
    }

    /// Tear down a superseded turn: stop its capture, free its locks, and
    /// silence the speaker, all before the successor proceeds
    fn cancel_turn(&self, prev: TurnId) {
        tracing::info!(%prev, "turn superseded");
        if self.locks.holder(Resource::Microphone) == Some(prev) {
            if let Ok(mut capture) = self.capture.lock() {
                // Discard whatever was captured; the turn is dead
                let _ = capture.stop();
            }
        }
        self.locks.release_all(prev);
        self.clients.synthesizer.cancel();
        self.publish(TurnSnapshot {
            turn: prev,
            stage: Stage::Cancelled,
        });
    }

    /// End a turn quietly without a terminal stage (no-op turns)
    fn abandon(&self, id: TurnId) {
        self.locks.release_all(id);
        if self
            .active
            .compare_exchange(id.0, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.publish(TurnSnapshot {
                turn: id,
                stage: Stage::Idle,
            });
        }
    }

    /// End a turn with a terminal stage, then return to rest
    fn end_turn(&self, id: TurnId, stage: Stage) {
        self.locks.release_all(id);
        if self
            .active
            .compare_exchange(id.0, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.publish(TurnSnapshot { turn: id, stage });
            self.publish(TurnSnapshot {
                turn: id,
                stage: Stage::Idle,
            });
        }
    }

    /// Hold the speaker lock for the duration of one utterance
    async fn speak_for(&self, id: TurnId, utterance: Utterance) -> Result<()> {
        if !self.locks.try_acquire(Resource::Speaker, id) {
            return Err(Error::DeviceBusy("speaker"));
        }
        self.publish_for(id, Stage::Speaking);
        let result = self.clients.synthesizer.speak(&utterance).await;
        self.locks.release(Resource::Speaker, id);
        result
    }

    /// Speak a system announcement as its own ephemeral turn
    ///
    /// Announcements never queue: if a turn is in progress or the speaker is
    /// busy, the announcement is dropped.
    async fn announce(&self, text: String) {
        if self.active.load(Ordering::SeqCst) != 0 {
            tracing::debug!("announcement dropped, turn in progress");
            return;
        }
        let id = self.alloc_id();
        if !self.locks.try_acquire(Resource::Speaker, id) {
            tracing::debug!("announcement dropped, speaker busy");
            return;
        }
        self.publish(TurnSnapshot {
            turn: id,
            stage: Stage::Speaking,
        });

        let utterance = Utterance::new(text, Origin::SystemAnnouncement, self.speed());
        if let Err(e) = self.clients.synthesizer.speak(&utterance).await {
            tracing::warn!(error = %e, "announcement playback failed");
        }

        self.locks.release(Resource::Speaker, id);
        self.publish(TurnSnapshot {
            turn: id,
            stage: Stage::Done,
        });
        self.publish(TurnSnapshot {
            turn: id,
            stage: Stage::Idle,
        });
    }
}

/// Wording for a speed-change announcement
///
/// The clamp boundaries get explicit ceiling/floor phrasing so the user
/// knows the drag has hit its limit.
fn speed_announcement(clamped: f32) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (f64::from(clamped) * 100.0).round() as u32;
    if clamped >= MAX_SPEED {
        "Maximum speed, 120 percent.".to_string()
    } else if clamped <= MIN_SPEED {
        "Minimum speed, 70 percent.".to_string()
    } else {
        format!("Speed set to {percent} percent.")
    }
}

/// Single-active-turn voice interaction orchestrator
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator over a capture session and provider clients
    #[must_use]
    pub fn new(capture: Box<dyn CaptureSession>, clients: Clients, speed: f32) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                clients,
                locks: ResourceLocks::new(),
                active: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                snapshots,
                current: Mutex::new(TurnSnapshot {
                    turn: TurnId(0),
                    stage: Stage::Idle,
                }),
                capture: Mutex::new(capture),
                photo: Mutex::new(None),
                speed: Mutex::new(clamp_speed(speed)),
                prompt_cursor: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to turn/stage snapshots
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TurnSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// The most recently published snapshot
    #[must_use]
    pub fn current(&self) -> TurnSnapshot {
        self.inner
            .current
            .lock()
            .map(|c| *c)
            .unwrap_or(TurnSnapshot {
                turn: TurnId(0),
                stage: Stage::Idle,
            })
    }

    /// Current playback speed
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.inner.speed()
    }

    /// Install the photo voice turns will ask about
    ///
    /// Replacing the photo drops the previous upload cache; the same photo is
    /// uploaded at most once across turns.
    pub fn set_photo(&self, photo: Photo) {
        if let Ok(mut slot) = self.inner.photo.lock() {
            *slot = Some(PhotoState {
                photo,
                uploaded: None,
            });
        }
    }

    /// Discard the current photo
    pub fn clear_photo(&self) {
        if let Ok(mut slot) = self.inner.photo.lock() {
            *slot = None;
        }
    }

    /// Whether a photo is installed
    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.inner
            .photo
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Begin a new voice turn, superseding any turn in flight
    ///
    /// On success the microphone is held and capture is running.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if microphone access is unavailable, or the
    /// capture session's error if it cannot start. Either way the
    /// orchestrator returns to `Idle`.
    pub fn start_recording(&self) -> Result<TurnId> {
        let id = self.inner.alloc_id();
        let prev = self.inner.active.swap(id.0, Ordering::SeqCst);
        if prev != 0 {
            self.inner.cancel_turn(TurnId(prev));
        } else {
            // An announcement may hold the speaker without being the active
            // turn; a new turn silences it the same way it silences a
            // superseded turn
            self.inner.clients.synthesizer.cancel();
        }

        {
            let Ok(mut capture) = self.inner.capture.lock() else {
                self.inner.abandon(id);
                return Err(Error::Audio("capture session unavailable".to_string()));
            };
            if !capture.request_permission() {
                drop(capture);
                self.inner.abandon(id);
                return Err(Error::PermissionDenied("microphone access not granted"));
            }
            if !self.inner.locks.try_acquire(Resource::Microphone, id) {
                drop(capture);
                self.inner.abandon(id);
                return Err(Error::DeviceBusy("microphone"));
            }
            if let Err(e) = capture.start() {
                drop(capture);
                self.inner.abandon(id);
                return Err(e);
            }
        }

        self.inner.publish_for(id, Stage::Recording);
        Ok(id)
    }

    /// Finish recording and hand the turn to the async pipeline
    ///
    /// The microphone is released before transcription begins. A recording
    /// with no audio ends the turn quietly in `Idle`. Must be called inside
    /// a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Audio` if the capture session is unavailable
    pub fn stop_recording(&self) -> Result<()> {
        let active = self.inner.active.load(Ordering::SeqCst);
        if active == 0 {
            tracing::debug!("stop with no active turn, ignoring");
            return Ok(());
        }
        let id = TurnId(active);

        let recording = {
            let Ok(mut capture) = self.inner.capture.lock() else {
                self.inner.abandon(id);
                return Err(Error::Audio("capture session unavailable".to_string()));
            };
            capture.stop()
        };
        self.inner.locks.release(Resource::Microphone, id);

        let Some(recording) = recording else {
            tracing::info!(%id, "empty recording, ending turn");
            self.inner.abandon(id);
            return Ok(());
        };

        tokio::spawn(run_pipeline(Arc::clone(&self.inner), id, recording));
        Ok(())
    }

    /// Cancel the active turn, if any
    pub fn cancel_active(&self) {
        let prev = self.inner.active.swap(0, Ordering::SeqCst);
        if prev != 0 {
            let prev = TurnId(prev);
            self.inner.cancel_turn(prev);
            self.inner.publish(TurnSnapshot {
                turn: prev,
                stage: Stage::Idle,
            });
        }
    }

    /// Set the playback speed, clamped into [0.7, 1.2], and announce it
    ///
    /// Returns the clamped value. The announcement is dropped if a turn is
    /// in progress or the speaker is busy; the speed still changes.
    pub async fn set_speed(&self, requested: f32) -> f32 {
        let clamped = clamp_speed(requested);
        if let Ok(mut speed) = self.inner.speed.lock() {
            *speed = clamped;
        }
        tracing::info!(requested, clamped, "playback speed changed");
        self.inner.announce(speed_announcement(clamped)).await;
        clamped
    }

    /// Speak the next example question from the prompt pool
    ///
    /// Returns the question offered, whether or not it was audible.
    pub async fn announce_prompt(&self) -> String {
        let index = self.inner.prompt_cursor.fetch_add(1, Ordering::Relaxed);
        let question = QUESTION_PROMPTS[index % QUESTION_PROMPTS.len()];
        self.inner.announce(format!("Try asking: {question}")).await;
        question.to_string()
    }
}

/// Drive one turn from transcription through the spoken answer
///
/// Every await is followed by a staleness check; a superseded turn stops at
/// the next checkpoint without publishing or mutating anything.
async fn run_pipeline(inner: Arc<Inner>, id: TurnId, recording: Recording) {
    inner.publish_for(id, Stage::Transcribing);

    let transcript = match inner.clients.transcriber.transcribe(recording).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => return fail_turn(&inner, id, &e).await,
    };
    if !inner.still_active(id) {
        return;
    }

    if transcript.is_empty() {
        tracing::info!(%id, "silent recording, ending turn");
        inner.abandon(id);
        return;
    }

    // Echo the transcript back so the user hears what was understood
    let speed = inner.speed();
    let confirmation = Utterance::new(transcript.clone(), Origin::UserSpeech, speed);
    if let Err(e) = inner.speak_for(id, confirmation).await {
        return fail_turn(&inner, id, &e).await;
    }
    if !inner.still_active(id) {
        return;
    }

    let pending = inner.photo.lock().ok().and_then(|slot| {
        slot.as_ref().map(|state| {
            (state.photo.clone(), state.uploaded.clone())
        })
    });
    let Some((photo, cached)) = pending else {
        tracing::info!(%id, "no photo installed, turn complete");
        inner.end_turn(id, Stage::Done);
        return;
    };

    inner.publish_for(id, Stage::Uploading);
    let image = if let Some(image) = cached {
        tracing::debug!(%id, gs_uri = %image.gs_uri, "reusing uploaded photo");
        image
    } else {
        let image = match inner.clients.uploader.upload(&photo).await {
            Ok(image) => image,
            Err(e) => return fail_turn(&inner, id, &e).await,
        };
        if !inner.still_active(id) {
            return;
        }
        if let Ok(mut slot) = inner.photo.lock() {
            if let Some(state) = slot.as_mut() {
                if state.photo.path == photo.path {
                    state.uploaded = Some(image.clone());
                }
            }
        }
        image
    };
    if !inner.still_active(id) {
        return;
    }

    inner.publish_for(id, Stage::Analyzing);
    let answer = match inner.clients.vision.query(&image, &transcript).await {
        Ok(answer) => answer,
        Err(e) => return fail_turn(&inner, id, &e).await,
    };
    if !inner.still_active(id) {
        return;
    }

    let spoken = Utterance::new(answer, Origin::ModelAnswer, speed);
    match inner.speak_for(id, spoken).await {
        Ok(()) => inner.end_turn(id, Stage::Done),
        Err(e) => fail_turn(&inner, id, &e).await,
    }
}

/// Error floor: publish `Error`, free the turn's locks, speak a short
/// apology, and return to `Idle`
///
/// If even the apology cannot be synthesized the turn ends silently.
async fn fail_turn(inner: &Inner, id: TurnId, err: &Error) {
    tracing::error!(%id, error = %err, "turn failed");
    if !inner.still_active(id) {
        return;
    }

    inner.publish(TurnSnapshot {
        turn: id,
        stage: Stage::Error,
    });
    inner.locks.release_all(id);

    if inner.locks.try_acquire(Resource::Speaker, id) {
        let apology = Utterance::new(APOLOGY, Origin::SystemAnnouncement, inner.speed());
        if let Err(speak_err) = inner.clients.synthesizer.speak(&apology).await {
            tracing::warn!(error = %speak_err, "apology playback failed, ending silently");
        }
        inner.locks.release(Resource::Speaker, id);
    }

    if inner
        .active
        .compare_exchange(id.0, 0, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        inner.publish(TurnSnapshot {
            turn: id,
            stage: Stage::Idle,
        });
    }
}
