//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

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

/// Medscribe application configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "medscribe")]
#[command(author, version, about = "Dictate a consultation, extract prescription fields, render the document", long_about = None)]
pub struct AppConfig {
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

    /// Quiet window in milliseconds for coalescing finalized segments into one
    /// transcript append
    #[arg(long, default_value = "500")]
    pub quiet_window_ms: u64,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Gemini model used for field extraction
    #[arg(long, short = 'm', env = "GEMINI_MODEL", default_value = "gemini-1.5-flash-latest")]
    pub gemini_model: String,

    /// Extraction temperature (0.0-2.0). Keep low: extraction should be factual
    #[arg(long, default_value = "0.2", value_parser = parse_temperature)]
    pub temperature: f32,

    /// Directory where generated documents are written
    #[arg(long, short = 'o', default_value = ".")]
    pub output_dir: PathBuf,

    /// STT language code (e.g., en, es, fr). Use "auto" for detection
    #[arg(long, default_value = "en")]
    pub stt_language: String,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Number of threads for Whisper (0 = auto-detect from CPU cores)
    #[arg(long, default_value = "0")]
    pub stt_threads: usize,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();
        config.normalize_thread_counts();
        config
    }

    /// Auto-detect Whisper thread count. With GPU providers one thread is
    /// enough; on CPU leave headroom for the VAD and the event loop.
    fn normalize_thread_counts(&mut self) {
        if self.stt_threads == 0 {
            self.stt_threads = if self.effective_provider() == Provider::Cuda { 1 } else { (num_cpus::get() / 3).max(1) };
        }
    }

    /// Get the effective acceleration provider.
    pub fn effective_provider(&self) -> Provider {
        self.provider.unwrap_or_else(detect_provider)
    }

    /// Path to the Whisper encoder model.
    pub fn whisper_encoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-encoder.int8.onnx")
    }

    /// Path to the Whisper decoder model.
    pub fn whisper_decoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-decoder.int8.onnx")
    }

    /// Path to the Whisper tokens file.
    pub fn whisper_tokens_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-tokens.txt")
    }

    /// Path to the VAD model.
    pub fn vad_model_path(&self) -> PathBuf {
        self.model_dir.join("silero_vad.onnx")
    }

    /// Effective STT language code for Whisper; empty string triggers
    /// auto-detection.
    pub fn effective_stt_language(&self) -> &str {
        if self.stt_language.eq_ignore_ascii_case("auto") { "" } else { &self.stt_language }
    }

    /// Validate numeric ranges and the output directory.
    /// Model files are deliberately not checked here: a missing model makes
    /// capture unavailable but the rest of the application still works.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            anyhow::bail!("VAD threshold must be between 0.0 and 1.0");
        }
        if self.quiet_window_ms == 0 {
            anyhow::bail!("Quiet window must be at least 1ms");
        }
        if !self.output_dir.exists() {
            anyhow::bail!("Output directory does not exist: {}", self.output_dir.display());
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Model directory: {}", self.model_dir.display());
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  VAD threshold: {}", self.vad_threshold);
        info!("  Quiet window: {}ms", self.quiet_window_ms);
        info!("  Gemini model: {}", self.gemini_model);
        info!("  Temperature: {}", self.temperature);
        info!("  Output directory: {}", self.output_dir.display());
        info!("  STT language: {}", self.stt_language);
        info!("  Provider: {}", self.effective_provider());
        info!("  STT threads: {}", self.stt_threads);
    }
}

/// Get the default model directory (~/.medscribe/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() { home_dir.join(".medscribe").join("models") } else { PathBuf::from("models") }
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

    let nvidia_paths = ["/dev/nvidia0", "/dev/nvidiactl", "/dev/nvidia-uvm"];
    nvidia_paths.iter().any(|path| Path::new(path).exists()) || Path::new("/etc/nv_tegra_release").exists()
}

/// Parse and validate temperature value (0.0-2.0).
fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    if (0.0..=2.0).contains(&value) { Ok(value) } else { Err(format!("temperature must be between 0.0 and 2.0, got {}", value)) }
}
