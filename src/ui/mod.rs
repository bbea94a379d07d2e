//! Presentation: pure rendering of the session state.

mod view;

pub use view::{DiscStyle, mic_glyph, panel_text, render_frame, toggle_label};
