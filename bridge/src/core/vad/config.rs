//! VAD configuration types

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Analysis window in samples (32ms at 8kHz)
pub const VAD_WINDOW_SAMPLES: usize = 256;

/// Speech classifier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VADBackend {
    /// RMS energy mapped to a probability
    #[default]
    Energy,
    /// Silero VAD - ML-based, requires the `silero-vad` feature
    Silero,
}

impl std::fmt::Display for VADBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VADBackend::Energy => write!(f, "energy"),
            VADBackend::Silero => write!(f, "silero"),
        }
    }
}

impl std::str::FromStr for VADBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "energy" => Ok(VADBackend::Energy),
            "silero" => Ok(VADBackend::Silero),
            other => Err(format!("Unknown VAD backend '{other}'")),
        }
    }
}

/// Configuration for Voice Activity Detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VADConfig {
    /// Enable/disable VAD processing
    pub enabled: bool,

    /// Classifier to use
    pub backend: VADBackend,

    /// Speech probability threshold (0.0 - 1.0)
    pub threshold: f32,

    /// Consecutive speech windows before speech_started fires
    pub speech_threshold_frames: u32,

    /// Consecutive silence windows before speech_ended fires
    pub silence_threshold_frames: u32,

    /// Sample rate of the analysed audio (Hz)
    pub sample_rate: u32,

    /// Window size in samples
    pub frame_size: usize,

    /// Path to the ONNX model file (Silero only)
    pub model_path: Option<PathBuf>,

    /// URL to download the model from
    pub model_url: Option<String>,

    /// Cache directory for downloaded models
    pub cache_path: Option<PathBuf>,

    /// Number of threads for ONNX inference
    pub num_threads: Option<usize>,
}

impl Default for VADConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: VADBackend::Energy,
            threshold: 0.5,
            speech_threshold_frames: 3,
            silence_threshold_frames: 10,
            sample_rate: 8000,
            frame_size: VAD_WINDOW_SAMPLES,
            model_path: None,
            model_url: Some(
                "https://github.com/snakers4/silero-vad/raw/master/src/silero_vad/data/silero_vad.onnx"
                    .to_string(),
            ),
            cache_path: None,
            num_threads: Some(1),
        }
    }
}

impl VADConfig {
    /// Directory holding the downloaded model, when a cache is configured
    pub fn model_cache_dir(&self) -> Option<PathBuf> {
        self.cache_path.as_ref().map(|path| path.join("vad"))
    }

    /// Window duration in milliseconds
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_size as f32 * 1000.0 / self.sample_rate as f32
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("VAD threshold {} outside 0.0 - 1.0", self.threshold);
        }
        if self.speech_threshold_frames == 0 || self.silence_threshold_frames == 0 {
            bail!("VAD speech and silence frame counts must be at least 1");
        }
        if self.frame_size == 0 {
            bail!("VAD window size must be at least 1 sample");
        }
        if self.backend == VADBackend::Silero && !matches!(self.sample_rate, 8000 | 16000) {
            bail!("Silero runs at 8 kHz or 16 kHz, not {} Hz", self.sample_rate);
        }
        Ok(())
    }
}
