//! Shared audio utilities for the capture path.

use anyhow::Result;
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

/// Get a human-readable device name.
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Find the best matching input configuration.
///
/// Searches for a configuration that:
/// 1. Supports mono or stereo (max 2 channels)
/// 2. Uses F32 sample format (universally supported on modern hardware)
/// 3. Matches the target sample rate, or uses the closest available rate
pub fn find_best_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_sample_rate: u32) -> Result<SupportedStreamConfig> {
    let mut f32_configs: Vec<SupportedStreamConfigRange> = Vec::new();

    for config in configs {
        if config.channels() > 2 {
            continue;
        }

        if config.sample_format() == SampleFormat::F32 {
            f32_configs.push(config);
        }
    }

    if f32_configs.is_empty() {
        anyhow::bail!("No F32 audio configuration found - this is unexpected on modern hardware");
    }

    // Prefer a config that supports the target rate exactly
    for config in &f32_configs {
        let min_rate = config.min_sample_rate();
        let max_rate = config.max_sample_rate();

        if target_sample_rate >= min_rate && target_sample_rate <= max_rate {
            return Ok((*config).with_sample_rate(target_sample_rate));
        }
    }

    // Fall back to the closest rate the first config offers
    let config = &f32_configs[0];
    let rate = if target_sample_rate < config.min_sample_rate() {
        config.min_sample_rate()
    } else {
        config.max_sample_rate()
    };
    Ok((*config).with_sample_rate(rate))
}

/// Mix interleaved f32 samples down to mono.
///
/// Mono input is returned as-is; stereo is mixed by averaging the channels.
pub fn mix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        data.to_vec()
    } else {
        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
    }
}
