//! Audio capture and analysis.
//!
//! Cross-platform microphone capture using cpal with rubato resampling, plus
//! the FFT-based frequency analyser that drives the visual level meter.

pub mod analyser;
mod capture;
pub mod resampler;
pub mod util;

pub use analyser::{FrequencyAnalyser, SpectrumAnalyser, mean_level};
pub use capture::{CaptureError, CaptureProvider, CaptureStream, CpalCapture, SampleSink};
