//! voice-blob - live voice transcription with a level-reactive disc visual.
//!
//! Toggles continuous speech recognition (Whisper via sherpa-onnx, segmented
//! by Silero VAD) in one of two languages, samples a microphone-driven audio
//! level once per animation frame while listening, and renders the disc
//! styling and live transcript as a terminal status line.

mod audio;
mod config;
mod controller;
mod session;
mod stt;
mod ui;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use audio::{CpalCapture, FrequencyAnalyser, SampleSink, SpectrumAnalyser};
use config::AppConfig;
use controller::Controller;
use stt::{RecognitionEvent, SherpaProvider};

/// Spawn the cooperative level-sampling task for one listening generation.
///
/// Each tick samples the analyser through the controller; the task exits
/// without rescheduling as soon as the controller reports the generation
/// stale or listening over.
fn spawn_level_task(controller: Arc<Mutex<Controller>>, generation: u64, frame: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(frame);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if !controller.lock().sample_frame(generation) {
                break;
            }
        }
    });
}

/// Spawn the render task: redraw the status line in place at the frame rate.
fn spawn_render_task(controller: Arc<Mutex<Controller>>, frame: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(frame);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_line = String::new();
        loop {
            interval.tick().await;
            let line = ui::render_frame(&controller.lock().snapshot());
            if line != last_line {
                print!("\r\x1b[2K{}", line);
                let _ = std::io::stdout().flush();
                last_line = line;
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    // Logs go to stderr; stdout carries the in-place status line
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🎙️ voice-blob v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        error!("Download the Whisper and Silero VAD models into the model directory first.");
        std::process::exit(1);
    }

    config.log_config();

    let (event_tx, mut event_rx) = mpsc::channel::<RecognitionEvent>(16);

    // The capture sink fans samples out to the analyser (level meter) and to
    // whichever recognition session is currently live.
    let analyser = Arc::new(Mutex::new(SpectrumAnalyser::new()));
    let recognition = SherpaProvider::new(&config, event_tx);
    let feed = recognition.feed();

    let analyser_sink = analyser.clone();
    let sink: SampleSink = Arc::new(move |samples: &[f32]| {
        analyser_sink.lock().push_samples(samples);
        feed.push(samples);
    });
    let capture = CpalCapture::new(config.sample_rate, sink);

    let analyser_dyn: Arc<Mutex<dyn FrequencyAnalyser>> = analyser;
    let controller = Arc::new(Mutex::new(Controller::new(config.language, Box::new(capture), Box::new(recognition), analyser_dyn)));

    let frame = Duration::from_millis((1000 / config.frame_rate.max(1)) as u64);
    let render_handle = spawn_render_task(controller.clone(), frame);

    info!("Press Enter to toggle listening, 'l' to switch language, 'q' to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown_signal() => break,
            line = lines.next_line() => {
                let Ok(Some(command)) = line else { break };
                match command.trim() {
                    // Enter: the click-the-disc toggle
                    "" => {
                        let started = {
                            let mut c = controller.lock();
                            if c.listening() {
                                c.stop();
                                None
                            } else {
                                c.start()
                            }
                        };
                        if let Some(generation) = started {
                            spawn_level_task(controller.clone(), generation, frame);
                        }
                    }
                    "l" | "lang" => {
                        let mut c = controller.lock();
                        let next = c.language().other();
                        c.set_language(next);
                    }
                    "q" | "quit" => break,
                    other => warn!("Unknown command: {:?}", other),
                }
            }
            Some(event) = event_rx.recv() => {
                controller.lock().handle_event(event);
            }
        }
    }

    controller.lock().dispose();
    render_handle.abort();
    println!();

    info!("✅ voice-blob stopped");
    Ok(())
}
