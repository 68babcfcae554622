//! End-to-end orchestrator tests over scripted providers

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{
    collect_until_rest, orchestrator, stages_for, FailingTranscriber, FailingUploader,
    HangingSynth, RecordingSynth, ScriptedCapture, StubTranscriber, StubUploader, StubVision,
};
use hearo::orchestrator::Stage;
use hearo::speech::Origin;
use hearo::vision::Photo;
use hearo::Error;

#[tokio::test]
async fn happy_path_walks_every_stage_in_order() {
    let synth = Arc::new(RecordingSynth::new());
    let uploader = Arc::new(StubUploader::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("what is in front of me")),
        Arc::clone(&synth),
        Arc::clone(&uploader),
        Arc::new(StubVision::new("In front of you is a red door.")),
    );
    orch.set_photo(Photo::from_path("/tmp/scene.jpg"));

    let mut rx = orch.subscribe();
    let id = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    let snapshots = collect_until_rest(&mut rx, id).await;
    assert_eq!(
        stages_for(&snapshots, id),
        vec![
            Stage::Recording,
            Stage::Transcribing,
            Stage::Speaking,
            Stage::Uploading,
            Stage::Analyzing,
            Stage::Speaking,
            Stage::Done,
            Stage::Idle,
        ]
    );

    // Confirmation echoes the transcript, then the model's answer is spoken
    let spoken = synth.spoken.lock().unwrap();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[0].text, "what is in front of me");
    assert_eq!(spoken[0].origin, Origin::UserSpeech);
    assert_eq!(spoken[1].text, "In front of you is a red door.");
    assert_eq!(spoken[1].origin, Origin::ModelAnswer);
}

#[tokio::test]
async fn silent_recording_ends_quietly() {
    let synth = Arc::new(RecordingSynth::new());
    let uploader = Arc::new(StubUploader::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("   ")),
        Arc::clone(&synth),
        Arc::clone(&uploader),
        Arc::new(StubVision::new("unused")),
    );
    orch.set_photo(Photo::from_path("/tmp/scene.jpg"));

    let mut rx = orch.subscribe();
    let id = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    let snapshots = collect_until_rest(&mut rx, id).await;
    assert_eq!(
        stages_for(&snapshots, id),
        vec![Stage::Recording, Stage::Transcribing, Stage::Idle]
    );
    assert!(synth.spoken.lock().unwrap().is_empty());
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_capture_is_a_noop_turn() {
    let synth = Arc::new(RecordingSynth::new());
    let orch = orchestrator(
        ScriptedCapture::silent(),
        Arc::new(StubTranscriber::new("unused")),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    );

    let mut rx = orch.subscribe();
    let id = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    let snapshots = collect_until_rest(&mut rx, id).await;
    assert_eq!(
        stages_for(&snapshots, id),
        vec![Stage::Recording, Stage::Idle]
    );
    assert!(synth.spoken.lock().unwrap().is_empty());
}

#[tokio::test]
async fn turn_without_photo_stops_after_confirmation() {
    let synth = Arc::new(RecordingSynth::new());
    let uploader = Arc::new(StubUploader::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("hello")),
        Arc::clone(&synth),
        Arc::clone(&uploader),
        Arc::new(StubVision::new("unused")),
    );

    let mut rx = orch.subscribe();
    let id = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    let snapshots = collect_until_rest(&mut rx, id).await;
    assert_eq!(
        stages_for(&snapshots, id),
        vec![
            Stage::Recording,
            Stage::Transcribing,
            Stage::Speaking,
            Stage::Done,
            Stage::Idle,
        ]
    );
    assert_eq!(synth.spoken_texts(), vec!["hello".to_string()]);
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_failure_publishes_error_and_speaks_apology() {
    let synth = Arc::new(RecordingSynth::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("what is this")),
        Arc::clone(&synth),
        Arc::new(FailingUploader),
        Arc::new(StubVision::new("unused")),
    );
    orch.set_photo(Photo::from_path("/tmp/scene.jpg"));

    let mut rx = orch.subscribe();
    let id = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    let snapshots = collect_until_rest(&mut rx, id).await;
    assert_eq!(
        stages_for(&snapshots, id),
        vec![
            Stage::Recording,
            Stage::Transcribing,
            Stage::Speaking,
            Stage::Uploading,
            Stage::Error,
            Stage::Idle,
        ]
    );

    let texts = synth.spoken_texts();
    assert_eq!(texts.last().unwrap(), "Sorry, something went wrong. Please try again.");

    // Both device locks must be free again: a fresh turn records and runs
    let id2 = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();
    let snapshots = collect_until_rest(&mut rx, id2).await;
    let stages = stages_for(&snapshots, id2);
    assert_eq!(stages.first(), Some(&Stage::Recording));
    assert!(stages.contains(&Stage::Error));
}

#[tokio::test]
async fn transcription_failure_ends_in_error() {
    let synth = Arc::new(RecordingSynth::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(FailingTranscriber),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    );

    let mut rx = orch.subscribe();
    let id = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    let snapshots = collect_until_rest(&mut rx, id).await;
    assert_eq!(
        stages_for(&snapshots, id),
        vec![
            Stage::Recording,
            Stage::Transcribing,
            Stage::Error,
            Stage::Idle,
        ]
    );
    assert_eq!(
        synth.spoken_texts(),
        vec!["Sorry, something went wrong. Please try again.".to_string()]
    );
}

#[tokio::test]
async fn double_tap_cancels_the_recording_turn() {
    let synth = Arc::new(RecordingSynth::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("second question")),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    );

    let mut rx = orch.subscribe();
    let first = orch.start_recording().unwrap();
    let second = orch.start_recording().unwrap();
    assert_ne!(first, second);

    orch.stop_recording().unwrap();
    let snapshots = collect_until_rest(&mut rx, second).await;

    assert_eq!(stages_for(&snapshots, first), vec![Stage::Recording, Stage::Cancelled]);
    let second_stages = stages_for(&snapshots, second);
    assert_eq!(second_stages.first(), Some(&Stage::Recording));
    assert!(second_stages.contains(&Stage::Done));
}

#[tokio::test]
async fn supersession_mid_pipeline_discards_the_stale_turn() {
    let synth = Arc::new(RecordingSynth::new());
    let transcriber = Arc::new(StubTranscriber::slow_first(
        "question",
        Duration::from_millis(500),
    ));
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::clone(&transcriber),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("an answer")),
    );
    orch.set_photo(Photo::from_path("/tmp/scene.jpg"));

    let mut rx = orch.subscribe();
    let first = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    // Let the first turn get stuck inside transcription
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();

    let snapshots = collect_until_rest(&mut rx, second).await;

    // The first turn was cancelled and never produced a terminal Done/Error
    let first_stages = stages_for(&snapshots, first);
    assert!(first_stages.contains(&Stage::Cancelled));
    assert!(!first_stages.contains(&Stage::Done));
    assert!(!first_stages.contains(&Stage::Error));

    // Cancellation silenced the speaker
    assert!(synth.cancels.load(Ordering::SeqCst) >= 1);
    assert!(snapshots.iter().any(|s| s.turn == second && s.stage == Stage::Done));

    // Once the stale transcription wakes up it must add nothing
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        synth.spoken_texts(),
        vec!["question".to_string(), "an answer".to_string()]
    );
}

#[tokio::test]
async fn denied_permission_returns_to_idle() {
    let orch = orchestrator(
        ScriptedCapture::without_permission(),
        Arc::new(StubTranscriber::new("unused")),
        Arc::new(RecordingSynth::new()),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    );

    let err = orch.start_recording().unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    assert_eq!(orch.current().stage, Stage::Idle);

    // No turn was left active
    orch.stop_recording().unwrap();
    assert_eq!(orch.current().stage, Stage::Idle);
}

#[tokio::test]
async fn speed_clamps_and_announces_the_boundary() {
    let synth = Arc::new(RecordingSynth::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("unused")),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    );

    assert_eq!(orch.set_speed(5.0).await, 1.2);
    assert_eq!(orch.speed(), 1.2);
    assert_eq!(orch.set_speed(0.1).await, 0.7);
    assert_eq!(orch.set_speed(0.9).await, 0.9);

    let spoken = synth.spoken.lock().unwrap();
    assert_eq!(spoken.len(), 3);
    assert_eq!(spoken[0].text, "Maximum speed, 120 percent.");
    assert_eq!(spoken[0].speed, 1.2);
    assert_eq!(spoken[1].text, "Minimum speed, 70 percent.");
    assert_eq!(spoken[2].text, "Speed set to 90 percent.");
    for utterance in spoken.iter() {
        assert_eq!(utterance.origin, Origin::SystemAnnouncement);
    }
}

#[tokio::test]
async fn speed_announcement_is_dropped_while_a_turn_runs() {
    let synth = Arc::new(RecordingSynth::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("unused")),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    );

    orch.start_recording().unwrap();
    assert_eq!(orch.set_speed(0.8).await, 0.8);

    // The speed changed but nothing was spoken over the active turn
    assert_eq!(orch.speed(), 0.8);
    assert!(synth.spoken.lock().unwrap().is_empty());

    orch.cancel_active();
    assert_eq!(orch.current().stage, Stage::Idle);
}

#[tokio::test]
async fn new_turn_silences_an_in_flight_announcement() {
    let synth = Arc::new(HangingSynth::new());
    let orch = Arc::new(orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("unused")),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    ));

    let announcer = Arc::clone(&orch);
    let announcement = tokio::spawn(async move { announcer.set_speed(1.0).await });

    // Let the announcement claim the speaker and start speaking
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!synth.cancelled.load(Ordering::SeqCst));

    orch.start_recording().unwrap();
    announcement.await.unwrap();
    assert!(synth.cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn same_photo_uploads_only_once_across_turns() {
    let synth = Arc::new(RecordingSynth::new());
    let uploader = Arc::new(StubUploader::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("what is this")),
        Arc::clone(&synth),
        Arc::clone(&uploader),
        Arc::new(StubVision::new("a chair")),
    );
    orch.set_photo(Photo::from_path("/tmp/scene.jpg"));

    let mut rx = orch.subscribe();
    for _ in 0..2 {
        let id = orch.start_recording().unwrap();
        orch.stop_recording().unwrap();
        let snapshots = collect_until_rest(&mut rx, id).await;
        assert!(stages_for(&snapshots, id).contains(&Stage::Uploading));
        assert!(stages_for(&snapshots, id).contains(&Stage::Done));
    }
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);

    // A new photo invalidates the cache
    orch.set_photo(Photo::from_path("/tmp/other.jpg"));
    let id = orch.start_recording().unwrap();
    orch.stop_recording().unwrap();
    collect_until_rest(&mut rx, id).await;
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn prompt_pool_rotates_and_is_spoken() {
    let synth = Arc::new(RecordingSynth::new());
    let orch = orchestrator(
        ScriptedCapture::new(),
        Arc::new(StubTranscriber::new("unused")),
        Arc::clone(&synth),
        Arc::new(StubUploader::new()),
        Arc::new(StubVision::new("unused")),
    );

    let first = orch.announce_prompt().await;
    let second = orch.announce_prompt().await;
    assert!(first.ends_with('?'));
    assert_ne!(first, second);

    let texts = synth.spoken_texts();
    assert_eq!(texts[0], format!("Try asking: {first}"));
    assert_eq!(texts[1], format!("Try asking: {second}"));
}
