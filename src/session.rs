//! Session state: the listening flag, selected language, live transcript,
//! and the frame-sampled audio level.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Recognition language. Exactly two are supported; the UI control is a
/// binary toggle, so adding a third would require a selection list instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Bangla (bn-BD)
    #[default]
    Bangla,
    /// English (en-US)
    English,
}

impl Language {
    /// BCP-47 language tag, as the recognition provider expects it.
    pub fn bcp47(&self) -> &'static str {
        match self {
            Language::Bangla => "bn-BD",
            Language::English => "en-US",
        }
    }

    /// Whisper language code (ISO 639-1) for the recognition model.
    pub fn whisper_code(&self) -> &'static str {
        match self {
            Language::Bangla => "bn",
            Language::English => "en",
        }
    }

    /// Human-readable name shown on the language-toggle control.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Bangla => "বাংলা",
            Language::English => "English",
        }
    }

    /// Placeholder shown in the transcript panel while the transcript is empty.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Language::Bangla => "শুরু করতে ব্লবটিতে ক্লিক করুন...",
            Language::English => "Click the blob to start listening...",
        }
    }

    /// The alternate language offered by the toggle control.
    pub fn other(&self) -> Language {
        match self {
            Language::Bangla => Language::English,
            Language::English => Language::Bangla,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.bcp47())
    }
}

/// Mutable session state, owned exclusively by the controller.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub listening: bool,
    pub language: Language,
    pub transcript: String,
    pub audio_level: f32,
}

impl SessionState {
    /// Initial state: idle, empty transcript, level zero.
    pub fn new(language: Language) -> Self {
        Self { listening: false, language, transcript: String::new(), audio_level: 0.0 }
    }

    /// Read-only view handed to the presentation layer.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            listening: self.listening,
            language: self.language,
            transcript: self.transcript.clone(),
            audio_level: self.audio_level,
        }
    }
}

/// Cloneable read-only view of the session state for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub listening: bool,
    pub language: Language,
    pub transcript: String,
    pub audio_level: f32,
}
