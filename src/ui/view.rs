//! Level-driven presentation.
//!
//! Everything here is a pure function of a `SessionSnapshot`. The disc styling
//! keeps the original widget's formulas so the visual reacts identically to
//! the audio level; the terminal frame derives its level bar from the computed
//! disc diameter.

use crate::session::{Language, SessionSnapshot};

/// Disc diameter in pixels at level zero.
const BASE_DIAMETER: f32 = 200.0;

/// Glow alpha at level zero (the original's resting box-shadow).
const BASE_GLOW: f32 = 0.4;

/// Width of the terminal level bar in cells.
const BAR_WIDTH: usize = 24;

/// Visual styling of the disc, derived from the audio level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscStyle {
    /// Diameter in pixels.
    pub diameter: f32,
    /// Blur radius in pixels.
    pub blur: f32,
    /// Scale transform factor.
    pub scale: f32,
    /// Glow alpha, monotonic in level, capped at 1.
    pub glow: f32,
}

impl DiscStyle {
    /// Compute the disc styling for an audio level in `[0, 255]`.
    pub fn from_level(level: f32) -> Self {
        Self {
            diameter: BASE_DIAMETER + level * 2.0,
            blur: 5.0 + level / 10.0,
            scale: 1.0 + level / 100.0,
            glow: (BASE_GLOW + level / 255.0 * 0.6).min(1.0),
        }
    }
}

/// Microphone glyph: active while listening, muted otherwise.
pub fn mic_glyph(listening: bool) -> &'static str {
    if listening { "🎤" } else { "🔇" }
}

/// Transcript panel text: the transcript, or the language-appropriate
/// placeholder while it is empty.
pub fn panel_text(transcript: &str, language: Language) -> &str {
    if transcript.is_empty() { language.placeholder() } else { transcript }
}

/// Label shown on the language-toggle control.
pub fn toggle_label(language: Language) -> &'static str {
    language.display_name()
}

/// Render one terminal status line from a snapshot.
///
/// The level bar's filled width derives from the disc diameter, so it grows
/// with the same monotonic response as the original visual.
pub fn render_frame(snapshot: &SessionSnapshot) -> String {
    let style = DiscStyle::from_level(snapshot.audio_level);
    let filled = (((style.diameter - BASE_DIAMETER) / (2.0 * 255.0)) * BAR_WIDTH as f32).round() as usize;
    let filled = filled.min(BAR_WIDTH);

    let mut bar = String::with_capacity(BAR_WIDTH * 3);
    for i in 0..BAR_WIDTH {
        bar.push(if i < filled { '█' } else { '░' });
    }

    format!("{} [{}] {} │ {}", mic_glyph(snapshot.listening), bar, toggle_label(snapshot.language), panel_text(&snapshot.transcript, snapshot.language))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(listening: bool, language: Language, transcript: &str, level: f32) -> SessionSnapshot {
        SessionSnapshot { listening, language, transcript: transcript.to_string(), audio_level: level }
    }

    #[test]
    fn test_disc_style_at_zero() {
        let style = DiscStyle::from_level(0.0);
        assert_eq!(style.diameter, 200.0);
        assert_eq!(style.blur, 5.0);
        assert_eq!(style.scale, 1.0);
        assert_eq!(style.glow, 0.4);
    }

    #[test]
    fn test_disc_style_at_hundred() {
        let style = DiscStyle::from_level(100.0);
        assert_eq!(style.diameter, 400.0);
        assert_eq!(style.blur, 15.0);
        assert_eq!(style.scale, 2.0);
    }

    #[test]
    fn test_disc_style_monotonic() {
        let mut previous = DiscStyle::from_level(0.0);
        for level in 1..=255 {
            let style = DiscStyle::from_level(level as f32);
            assert!(style.diameter > previous.diameter);
            assert!(style.blur > previous.blur);
            assert!(style.scale > previous.scale);
            assert!(style.glow >= previous.glow);
            previous = style;
        }
    }

    #[test]
    fn test_mic_glyph_flips_on_listening() {
        assert_eq!(mic_glyph(true), "🎤");
        assert_eq!(mic_glyph(false), "🔇");
    }

    #[test]
    fn test_panel_placeholder_per_language() {
        assert_eq!(panel_text("", Language::Bangla), Language::Bangla.placeholder());
        assert_eq!(panel_text("", Language::English), "Click the blob to start listening...");
        assert_eq!(panel_text("hello", Language::English), "hello");
    }

    #[test]
    fn test_toggle_label_names_current_language() {
        assert_eq!(toggle_label(Language::Bangla), "বাংলা");
        assert_eq!(toggle_label(Language::English), "English");
    }

    #[test]
    fn test_render_frame_bar_bounds() {
        let idle = render_frame(&snapshot(false, Language::English, "", 0.0));
        assert!(idle.contains("🔇"));
        assert!(!idle.contains('█'));

        let loud = render_frame(&snapshot(true, Language::English, "hi", 255.0));
        assert!(loud.contains("🎤"));
        assert!(!loud.contains('░'));
        assert!(loud.ends_with("hi"));
    }
}
