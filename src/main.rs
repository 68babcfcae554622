use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hearo::audio::{play_samples, MicCapture};
use hearo::orchestrator::{Clients, Orchestrator, Stage};
use hearo::server::ApiServer;
use hearo::speech::{
    ElevenLabsStt, Origin, SpeechCommandFallback, SpeechSynthesis, Synthesizer, Utterance,
};
use hearo::vision::{GeminiVision, Photo, SignedUrlUploader};
use hearo::{Config, Error};

/// Hearo - voice and vision assistant for blind and low-vision users
#[derive(Parser)]
#[command(name = "hearo", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the signed-URL issuing service
    Serve,
    /// Ask a question about a photo by voice
    Ask {
        /// Photo to describe
        photo: PathBuf,
        /// Playback speed (0.7 to 1.2)
        #[arg(short, long)]
        speed: Option<f32>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hearo=info",
        1 => "info,hearo=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve => serve().await,
        Command::Ask { photo, speed } => ask(photo, speed).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&text).await,
    }
}

/// Run the signed-URL issuing service
async fn serve() -> anyhow::Result<()> {
    let config = Config::load()?;
    let server = ApiServer::new(&config.server)?;
    server.run().await?;
    Ok(())
}

/// Build provider clients from configuration
fn build_clients(config: &Config) -> anyhow::Result<Clients> {
    let api_key = config.require_elevenlabs_key()?.to_string();
    let google_key = config
        .vision
        .google_api_key
        .clone()
        .ok_or_else(|| Error::Config("GOOGLE_API_KEY not set".to_string()))?;

    let fallback = Box::new(SpeechCommandFallback::new(
        config.voice.fallback_command.clone(),
    ));

    Ok(Clients {
        transcriber: Arc::new(ElevenLabsStt::new(
            api_key.clone(),
            config.voice.stt_model.clone(),
            config.voice.language.clone(),
        )?),
        synthesizer: Arc::new(SpeechSynthesis::new(
            api_key,
            config.voice.tts_voice.clone(),
            config.voice.tts_model.clone(),
            fallback,
        )?),
        uploader: Arc::new(SignedUrlUploader::new(config.vision.backend_url.clone())?),
        vision: Arc::new(GeminiVision::new(
            google_key,
            config.vision.model.clone(),
        )?),
    })
}

/// One voice turn about a photo: record until Enter, then listen for the answer
async fn ask(photo: PathBuf, speed: Option<f32>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let clients = build_clients(&config)?;
    let speed = speed.unwrap_or(config.voice.speed);

    let orchestrator = Orchestrator::new(Box::new(MicCapture::new()), clients, speed);
    orchestrator.set_photo(Photo::from_path(photo));

    let mut snapshots = orchestrator.subscribe();
    let id = orchestrator.start_recording()?;

    println!("Recording... press Enter to stop.");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    })
    .await?;

    orchestrator.stop_recording()?;

    // Follow the turn until it comes to rest
    while let Ok(snapshot) = snapshots.recv().await {
        if snapshot.turn != id {
            continue;
        }
        tracing::info!(stage = ?snapshot.stage, "turn progress");
        if snapshot.stage == Stage::Idle || snapshot.stage == Stage::Cancelled {
            break;
        }
    }

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    use hearo::audio::CaptureSession;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = MicCapture::new();
    capture.start()?;

    tokio::time::sleep(Duration::from_secs(duration)).await;

    match capture.stop() {
        Some(recording) => {
            println!(
                "Captured {:.1}s of audio ({} WAV bytes)",
                recording.duration.as_secs_f64(),
                recording.wav.len()
            );
            println!("Your microphone is working!");
        }
        None => {
            println!("No audio captured. Check:");
            println!("  1. Is your mic plugged in?");
            println!("  2. Run: arecord -l (to list devices)");
            println!("  3. Try: pavucontrol (to check levels)");
        }
    }

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_f32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate * 2.0) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples...", samples.len());

    let stop = Arc::new(AtomicBool::new(false));
    tokio::task::spawn_blocking(move || play_samples(samples, &stop)).await??;

    println!("\nIf you heard the tone, your speakers are working!");
    Ok(())
}

/// Test TTS output
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let api_key = config.require_elevenlabs_key()?.to_string();
    let fallback = Box::new(SpeechCommandFallback::new(
        config.voice.fallback_command.clone(),
    ));
    let synthesis = SpeechSynthesis::new(
        api_key,
        config.voice.tts_voice.clone(),
        config.voice.tts_model.clone(),
        fallback,
    )?;

    println!("Synthesizing and playing...");
    let utterance = Utterance::new(text, Origin::SystemAnnouncement, config.voice.speed);
    synthesis.speak(&utterance).await?;

    println!("\nIf you heard the speech, TTS is working!");
    Ok(())
}
