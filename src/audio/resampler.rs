//! Streaming audio resampling using the rubato FFT-based resampler.
//!
//! The capture device rarely runs at the 16 kHz the recognizer wants, so the
//! capture callback pushes its samples through this state machine, which
//! accumulates them into fixed chunks and resamples chunk by chunk.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use parking_lot::Mutex;
use rubato::{Fft, FixedSync, Resampler};
use std::sync::Arc;

/// Chunk size for FFT-based resampling (provides good quality and performance).
const CHUNK_SIZE: usize = 1024;

/// Number of sub-chunks for FFT processing (higher = better quality but more CPU).
const SUB_CHUNKS: usize = 2;

/// Shared resampler state for streaming audio (used in audio callbacks).
///
/// Maintains internal buffers and resampler state across callback invocations,
/// allowing efficient real-time resampling of variable-size input chunks.
pub struct ResamplerState {
    resampler: Fft<f32>,
    output_buffer: Vec<f32>,
    output_frames_max: usize,
    input_buffer: Vec<f32>, // Accumulates samples across callbacks
}

impl ResamplerState {
    /// Create a new resampler state for streaming audio.
    ///
    /// # Arguments
    /// * `from_rate` - Input sample rate (e.g., 48000)
    /// * `to_rate` - Output sample rate (e.g., 16000)
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Arc<Mutex<Self>>> {
        let resampler = Fft::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_SIZE,
            SUB_CHUNKS,
            1, // mono
            FixedSync::Input,
        )
        .context("Failed to create resampler")?;

        let output_frames_max = resampler.output_frames_max();

        Ok(Arc::new(Mutex::new(Self {
            resampler,
            output_buffer: vec![0.0f32; output_frames_max],
            output_frames_max,
            input_buffer: Vec::with_capacity(CHUNK_SIZE * 2),
        })))
    }

    /// Process incoming audio samples, accumulating until a full chunk is available.
    ///
    /// # Returns
    /// Resampled audio samples when a full chunk is processed, or `None` if more
    /// input is needed.
    pub fn process_samples(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.input_buffer.extend_from_slice(samples);

        if self.input_buffer.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.input_buffer.drain(..CHUNK_SIZE).collect();

            let input_adapter = InterleavedSlice::new(&chunk, 1, CHUNK_SIZE).ok()?;
            let mut output_adapter = InterleavedSlice::new_mut(&mut self.output_buffer, 1, self.output_frames_max).ok()?;

            let (_, frames_written) = self.resampler.process_into_buffer(&input_adapter, &mut output_adapter, None).ok()?;

            if frames_written > 0 { Some(self.output_buffer[..frames_written].to_vec()) } else { None }
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_downsample_ratio() {
        // Downsample 1 second of 48kHz audio to 16kHz in callback-sized chunks.
        let state = ResamplerState::new(48000, 16000).unwrap();
        let mut state = state.lock();

        let mut total_out = 0;
        for _ in 0..100 {
            if let Some(out) = state.process_samples(&[0.0f32; 480]) {
                total_out += out.len();
            }
        }

        // 48000 input samples resampled at 1/3 ratio, minus whatever is still
        // buffered below one chunk.
        assert!(total_out >= 15000 && total_out <= 16100, "Expected ~16000 samples, got {}", total_out);
    }

    #[test]
    fn test_small_chunks_buffer_until_full() {
        let state = ResamplerState::new(48000, 16000).unwrap();
        let mut state = state.lock();

        // Fewer than CHUNK_SIZE samples never produce output
        assert!(state.process_samples(&[0.0f32; 512]).is_none());
        // Crossing the chunk boundary flushes
        assert!(state.process_samples(&[0.0f32; 600]).is_some());
    }
}
