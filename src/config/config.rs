//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::Language;

/// Hardware acceleration provider for ONNX models.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only, requires CUDA toolkit)
    Cuda,
    /// Apple CoreML acceleration (macOS only, uses Neural Engine)
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Cpu => write!(f, "cpu"),
            Provider::Cuda => write!(f, "cuda"),
            Provider::CoreMl => write!(f, "coreml"),
        }
    }
}

impl Provider {
    /// Convert to sherpa-rs provider string.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// Voice transcription widget configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "voice-blob")]
#[command(author, version, about = "Live voice transcription with a level-reactive disc", long_about = None)]
pub struct AppConfig {
    /// Initial recognition language (toggle at runtime with 'l')
    #[arg(long, short = 'l', value_enum, default_value = "bangla")]
    pub language: Language,

    /// Directory containing model files (Whisper, VAD)
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,

    /// Audio sample rate for speech recognition
    #[arg(long, default_value = "16000")]
    pub sample_rate: u32,

    /// Voice activity detection threshold (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    pub vad_threshold: f32,

    /// VAD silence duration in seconds (how long to wait before considering speech ended)
    #[arg(long, default_value = "0.8")]
    pub vad_silence_duration: f32,

    /// Animation frame rate for the level meter (frames per second)
    #[arg(long, default_value = "60")]
    pub frame_rate: u32,

    /// Recognition session duration limit in seconds; the session is restarted
    /// transparently while listening (0 = unlimited)
    #[arg(long, default_value = "60")]
    pub session_limit_secs: u64,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Number of threads for all models (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    /// VAD threads (0 = use num_threads, typically 1)
    #[arg(long, default_value = "0")]
    pub vad_threads: usize,

    /// STT threads (0 = use num_threads, typically cores/3)
    #[arg(long, default_value = "0")]
    pub stt_threads: usize,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();
        config.normalize_thread_counts();
        config
    }

    /// Auto-detect and normalize thread counts based on CPU cores and provider.
    ///
    /// With CUDA, fewer threads (typically 1) should be used because the GPU
    /// handles parallelism internally; multiple CPU threads with GPU inference
    /// can cause resource contention and CUDA allocation failures.
    fn normalize_thread_counts(&mut self) {
        let cpu_cores = num_cpus::get();
        let using_cuda = self.effective_provider() == Provider::Cuda;

        if self.num_threads == 0 {
            if using_cuda {
                self.num_threads = 1;
            } else {
                // cores/3 leaves headroom for the capture and UI paths
                self.num_threads = (cpu_cores / 3).max(1);
            }
        }

        // VAD is lightweight
        if self.vad_threads == 0 {
            self.vad_threads = 1;
        }

        if self.stt_threads == 0 {
            self.stt_threads = if using_cuda { 1 } else { self.num_threads };
        }

        if self.verbose {
            info!("CPU cores: {}, Provider: {}, Thread counts: VAD={}, STT={}", cpu_cores, self.effective_provider(), self.vad_threads, self.stt_threads);
        }
    }

    /// Get the effective acceleration provider.
    pub fn effective_provider(&self) -> Provider {
        self.provider.unwrap_or_else(detect_provider)
    }

    /// Get the path to the Whisper encoder model (multilingual).
    pub fn whisper_encoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-encoder.int8.onnx")
    }

    /// Get the path to the Whisper decoder model (multilingual).
    pub fn whisper_decoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-decoder.int8.onnx")
    }

    /// Get the path to the Whisper tokens file (multilingual).
    pub fn whisper_tokens_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-tokens.txt")
    }

    /// Get the path to the VAD model.
    pub fn vad_model_path(&self) -> PathBuf {
        self.model_dir.join("silero_vad.onnx")
    }

    /// Validate the configuration. Ranges are checked before the model files
    /// so a bad flag is reported even on a machine without the models.
    pub fn validate(&self) -> Result<()> {
        if !(8000..=48000).contains(&self.sample_rate) {
            anyhow::bail!("Sample rate must be between 8000 and 48000 Hz");
        }

        if !(0.0..=1.0).contains(&self.vad_threshold) {
            anyhow::bail!("VAD threshold must be between 0.0 and 1.0");
        }

        if !(0.1..=10.0).contains(&self.vad_silence_duration) {
            anyhow::bail!("VAD silence duration must be between 0.1 and 10.0 seconds");
        }

        if !(1..=240).contains(&self.frame_rate) {
            anyhow::bail!("Frame rate must be between 1 and 240");
        }

        if !self.model_dir.exists() {
            anyhow::bail!("Model directory does not exist: {}", self.model_dir.display());
        }

        let required_files = [self.whisper_encoder_path(), self.whisper_decoder_path(), self.whisper_tokens_path(), self.vad_model_path()];

        for path in &required_files {
            if !path.exists() {
                anyhow::bail!("Required model file not found: {}", path.display());
            }
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Language: {} ({})", self.language.display_name(), self.language.bcp47());
        info!("  Model directory: {}", self.model_dir.display());
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  VAD threshold: {}", self.vad_threshold);
        info!("  Frame rate: {} fps", self.frame_rate);
        if self.session_limit_secs > 0 {
            info!("  Session limit: {}s", self.session_limit_secs);
        }
        info!("  Provider: {}", self.effective_provider());
    }
}

/// Get the default model directory (~/.voice-blob/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".voice-blob").join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() { Provider::Cuda } else { Provider::Cpu }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    let nvidia_paths = [
        "/dev/nvidia0",
        "/dev/nvidiactl",
        "/dev/nvidia-uvm",
        // Jetson devices
        "/dev/nvhost-ctrl",
        "/dev/nvhost-ctrl-gpu",
    ];

    for path in &nvidia_paths {
        if Path::new(path).exists() {
            return true;
        }
    }

    Path::new("/etc/nv_tegra_release").exists()
}
