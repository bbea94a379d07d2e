//! Speech recognition using sherpa-rs.
//!
//! Voice activity detection (Silero VAD) segments the capture feed and Whisper
//! transcribes completed segments. A recognition session is bound to exactly
//! one language for its lifetime; changing language means tearing the session
//! down and starting a fresh one.

mod recognizer;

pub use recognizer::{AudioFeed, SherpaProvider};

use anyhow::Result;

use crate::session::Language;

/// Event emitted by a recognition session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// A recognition result. Each result carries the full text of the latest
    /// utterance; consumers replace, never append.
    Result { text: String, is_final: bool },
    /// The session terminated on its own (duration limit, feed closed). The
    /// controller restarts the session while still listening.
    Ended,
}

/// Configuration for one recognition session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub language: Language,
    pub continuous: bool,
    pub interim_results: bool,
}

impl SessionConfig {
    /// Continuous session with interim results, the only mode the widget uses.
    pub fn continuous(language: Language) -> Self {
        Self { language, continuous: true, interim_results: true }
    }
}

/// Source of recognition sessions. Tests substitute a mock.
pub trait RecognitionProvider: Send {
    fn start_session(&mut self, config: SessionConfig) -> Result<Box<dyn RecognitionSession>>;
}

/// Live recognition session, exclusively owned by the controller.
pub trait RecognitionSession: Send {
    /// Stop the session. No `Ended` event is emitted for an explicit stop.
    fn stop(&mut self);
}
