//! sherpa-rs backed recognition provider.
//!
//! The Whisper recognizer is language-bound, so a language change is a session
//! rebuild; the loaded recognizers are cached per language and loaned to the
//! session worker, so each Whisper model is read from disk at most once. Each
//! session gets a fresh Silero VAD so detection state never carries over. A
//! worker thread consumes capture samples from the provider's feed slot,
//! segments them with VAD, and transcribes completed segments.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};
use sherpa_rs::whisper::{WhisperConfig, WhisperRecognizer};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use super::{RecognitionEvent, RecognitionProvider, RecognitionSession, SessionConfig};
use crate::config::AppConfig;
use crate::session::Language;

/// Minimum speech duration in seconds to be considered valid.
const MIN_SPEECH_DURATION: f32 = 0.1;

/// Maximum speech duration in seconds (prevent runaway segments).
const MAX_SPEECH_DURATION: f32 = 30.0;

/// VAD window size in samples (512 samples = 32ms at 16kHz).
const VAD_WINDOW_SIZE: i32 = 512;

/// Buffer size in seconds for VAD (how much audio to accumulate).
const VAD_BUFFER_SIZE_SECONDS: f32 = 60.0;

/// Capacity of the per-session audio inbox (~2 seconds of callback batches).
const FEED_CAPACITY: usize = 64;

type FeedSlot = Arc<Mutex<Option<SyncSender<Vec<f32>>>>>;

/// Clonable handle the capture sink uses to push samples into whichever
/// session is currently live. Pushes are dropped when no session is running
/// or the session inbox is full; the audio thread must never block here.
#[derive(Clone)]
pub struct AudioFeed(FeedSlot);

impl AudioFeed {
    pub fn push(&self, samples: &[f32]) {
        if let Some(tx) = self.0.lock().as_ref() {
            let _ = tx.try_send(samples.to_vec());
        }
    }
}

/// Model and runtime settings shared by every session this provider starts.
struct RecognizerSettings {
    vad_model: String,
    whisper_encoder: String,
    whisper_decoder: String,
    whisper_tokens: String,
    provider: String,
    sample_rate: u32,
    vad_threshold: f32,
    vad_silence_duration: f32,
    vad_threads: usize,
    stt_threads: usize,
    session_limit: Option<Duration>,
    debug: bool,
}

/// Per-language cache of loaded models. A live session's worker borrows the
/// entry for its language and returns it when the session ends, so the
/// expensive disk load happens at most once per language.
struct ModelCache<T> {
    slots: Mutex<HashMap<Language, T>>,
}

impl<T> ModelCache<T> {
    fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    fn take(&self, language: Language) -> Option<T> {
        self.slots.lock().remove(&language)
    }

    fn put(&self, language: Language, model: T) {
        self.slots.lock().insert(language, model);
    }
}

/// Recognition provider backed by sherpa-onnx Whisper + Silero VAD.
pub struct SherpaProvider {
    settings: Arc<RecognizerSettings>,
    events: Sender<RecognitionEvent>,
    feed: FeedSlot,
    recognizers: Arc<ModelCache<WhisperRecognizer>>,
}

impl SherpaProvider {
    pub fn new(config: &AppConfig, events: Sender<RecognitionEvent>) -> Self {
        let settings = RecognizerSettings {
            vad_model: config.vad_model_path().to_string_lossy().to_string(),
            whisper_encoder: config.whisper_encoder_path().to_string_lossy().to_string(),
            whisper_decoder: config.whisper_decoder_path().to_string_lossy().to_string(),
            whisper_tokens: config.whisper_tokens_path().to_string_lossy().to_string(),
            provider: config.effective_provider().as_sherpa_provider().to_string(),
            sample_rate: config.sample_rate,
            vad_threshold: config.vad_threshold,
            vad_silence_duration: config.vad_silence_duration,
            vad_threads: config.vad_threads,
            stt_threads: config.stt_threads,
            session_limit: (config.session_limit_secs > 0).then(|| Duration::from_secs(config.session_limit_secs)),
            debug: config.verbose,
        };

        Self {
            settings: Arc::new(settings),
            events,
            feed: Arc::new(Mutex::new(None)),
            recognizers: Arc::new(ModelCache::new()),
        }
    }

    /// Handle for the capture sink to feed the live session.
    pub fn feed(&self) -> AudioFeed {
        AudioFeed(self.feed.clone())
    }
}

impl RecognitionProvider for SherpaProvider {
    fn start_session(&mut self, config: SessionConfig) -> Result<Box<dyn RecognitionSession>> {
        let settings = self.settings.clone();
        let language = config.language;

        info!("Starting recognition session: language={}, continuous={}, interim_results={}", language.bcp47(), config.continuous, config.interim_results);

        let vad_config = SileroVadConfig {
            model: settings.vad_model.clone(),
            threshold: settings.vad_threshold,
            sample_rate: settings.sample_rate,
            min_silence_duration: settings.vad_silence_duration,
            min_speech_duration: MIN_SPEECH_DURATION,
            max_speech_duration: MAX_SPEECH_DURATION,
            window_size: VAD_WINDOW_SIZE,
            provider: Some(settings.provider.clone()),
            num_threads: Some(settings.vad_threads.try_into().unwrap_or(1)),
            debug: settings.debug,
        };

        let mut vad = SileroVad::new(vad_config, VAD_BUFFER_SIZE_SECONDS).map_err(|e| anyhow::anyhow!("Failed to initialize Silero VAD: {}", e))?;

        let mut whisper = match self.recognizers.take(language) {
            Some(recognizer) => recognizer,
            None => {
                let whisper_config = WhisperConfig {
                    encoder: settings.whisper_encoder.clone(),
                    decoder: settings.whisper_decoder.clone(),
                    tokens: settings.whisper_tokens.clone(),
                    language: language.whisper_code().to_string(),
                    provider: Some(settings.provider.clone()),
                    num_threads: Some(settings.stt_threads.try_into().unwrap_or(2)),
                    debug: settings.debug,
                    ..Default::default()
                };

                info!("Loading Whisper model for {}", language.display_name());
                WhisperRecognizer::new(whisper_config).map_err(|e| anyhow::anyhow!("Failed to initialize Whisper: {}", e))?
            }
        };

        let (audio_tx, audio_rx) = mpsc::sync_channel::<Vec<f32>>(FEED_CAPACITY);

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let events = self.events.clone();
        let sample_rate = settings.sample_rate;
        let session_limit = settings.session_limit;
        let recognizers = self.recognizers.clone();

        let handle = std::thread::spawn(move || {
            let deadline = session_limit.map(|limit| Instant::now() + limit);

            loop {
                if worker_stop.load(Ordering::Relaxed) {
                    debug!("Recognition session stopped");
                    break;
                }

                // Finite sessions: signal Ended so the controller can restart
                if let Some(deadline) = deadline
                    && Instant::now() >= deadline
                {
                    debug!("Recognition session reached its duration limit");
                    let _ = events.try_send(RecognitionEvent::Ended);
                    break;
                }

                match audio_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(samples) => {
                        vad.accept_waveform(samples);

                        while !vad.is_empty() {
                            let segment = vad.front();
                            vad.pop();

                            if segment.samples.is_empty() {
                                continue;
                            }

                            debug!("Transcribing segment: {} samples", segment.samples.len());
                            let result = whisper.transcribe(sample_rate, &segment.samples);
                            let text = result.text.trim().to_string();

                            if text.is_empty() {
                                debug!("Empty transcription result");
                                continue;
                            }

                            info!("🗣️ {}", text);
                            // Non-blocking send: the controller may be joining
                            // this thread while the event loop is paused.
                            if let Err(e) = events.try_send(RecognitionEvent::Result { text, is_final: true }) {
                                warn!("Failed to deliver recognition result: {}", e);
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        // Feed dropped out from under us; treat as a
                        // provider-initiated end unless we were stopped.
                        if !worker_stop.load(Ordering::Relaxed) {
                            let _ = events.try_send(RecognitionEvent::Ended);
                        }
                        break;
                    }
                }
            }

            // Hand the recognizer back so the next session for this language
            // skips the disk load.
            recognizers.put(language, whisper);
        });

        *self.feed.lock() = Some(audio_tx);

        Ok(Box::new(SherpaSession { stop, feed: self.feed.clone(), handle: Some(handle) }))
    }
}

/// Handle to a live session's worker thread.
struct SherpaSession {
    stop: Arc<AtomicBool>,
    feed: FeedSlot,
    handle: Option<JoinHandle<()>>,
}

impl RecognitionSession for SherpaSession {
    fn stop(&mut self) {
        if self.handle.is_none() {
            return;
        }

        self.stop.store(true, Ordering::SeqCst);
        // Disconnect the feed so no further audio reaches the worker
        *self.feed.lock() = None;

        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.join()
        {
            warn!("Failed to join recognition worker: {:?}", e);
        }
    }
}

impl Drop for SherpaSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_cache_loans_and_returns() {
        let cache: ModelCache<&str> = ModelCache::new();
        assert!(cache.take(Language::Bangla).is_none());

        cache.put(Language::Bangla, "loaded once");
        assert_eq!(cache.take(Language::Bangla), Some("loaded once"));
        // While on loan to a session there is nothing to hand out
        assert!(cache.take(Language::Bangla).is_none());

        cache.put(Language::Bangla, "loaded once");
        assert_eq!(cache.take(Language::Bangla), Some("loaded once"));
    }

    #[test]
    fn test_model_cache_is_per_language() {
        let cache: ModelCache<u32> = ModelCache::new();
        cache.put(Language::Bangla, 1);
        cache.put(Language::English, 2);

        assert_eq!(cache.take(Language::English), Some(2));
        assert_eq!(cache.take(Language::Bangla), Some(1));
        assert!(cache.take(Language::English).is_none());
    }
}
