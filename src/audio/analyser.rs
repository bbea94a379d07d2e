//! FFT-based frequency analysis for the level meter.
//!
//! Mirrors the byte-frequency interface of a browser analyser node: a 256-point
//! Hann-windowed FFT over the most recent capture samples, with per-bin
//! temporal smoothing and a decibel range mapped onto unsigned bytes. The
//! presentation only ever consumes the arithmetic mean of the bins.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// FFT window size in samples. Half of this is the number of frequency bins.
const FFT_SIZE: usize = 256;

/// Floor of the decibel range mapped to byte value 0.
const MIN_DECIBELS: f32 = -100.0;

/// Ceiling of the decibel range mapped to byte value 255.
const MAX_DECIBELS: f32 = -30.0;

/// Temporal smoothing constant applied to bin magnitudes between reads.
const SMOOTHING: f32 = 0.8;

/// Read access to byte frequency data, sampled once per animation frame.
pub trait FrequencyAnalyser: Send {
    /// Number of frequency bins produced per sample (half the FFT size).
    fn frequency_bin_count(&self) -> usize;

    /// Compute the current byte frequency data (one `0..=255` value per bin).
    fn sample_frequency_data(&mut self) -> Vec<u8>;

    /// Discard buffered samples and smoothing state.
    fn reset(&mut self);
}

/// Concrete analyser fed by the capture callback.
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,    // Most recent FFT_SIZE mono samples
    smoothed: Vec<f32>,   // Per-bin smoothed linear magnitudes
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
            window: generate_hann_window(FFT_SIZE),
            samples: Vec::with_capacity(FFT_SIZE),
            smoothed: vec![0.0; FFT_SIZE / 2],
            scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
        }
    }

    /// Feed captured mono samples; only the most recent window is retained.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
        if self.samples.len() > FFT_SIZE {
            self.samples.drain(..self.samples.len() - FFT_SIZE);
        }
    }
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyAnalyser for SpectrumAnalyser {
    fn frequency_bin_count(&self) -> usize {
        FFT_SIZE / 2
    }

    fn sample_frequency_data(&mut self) -> Vec<u8> {
        // Window the current samples into the scratch buffer, zero-padding
        // when less than a full window has been captured yet.
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = self.samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        self.smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() / FFT_SIZE as f32;
                *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
                byte_from_magnitude(*smoothed)
            })
            .collect()
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

/// Map a linear magnitude onto the analyser byte scale.
///
/// Converts to decibels and scales the `MIN_DECIBELS..MAX_DECIBELS` range onto
/// `0..=255`, clamping outside it. Zero magnitude maps to 0.
fn byte_from_magnitude(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 255.0;
    scaled.clamp(0.0, 255.0) as u8
}

/// Arithmetic mean of all frequency bins, the single "audio level" the
/// presentation reacts to. Empty input yields zero.
pub fn mean_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32
}

/// Generate a periodic Hann window to reduce spectral leakage.
fn generate_hann_window(size: usize) -> Vec<f32> {
    (0..size).map(|n| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / size as f32).cos())).collect()
}
