//! Speech classifiers

use crate::core::audio::AudioResult;

/// Maps one analysis window to a speech probability
pub trait SpeechClassifier: Send {
    /// Probability (0.0 - 1.0) that `window` contains speech
    fn probability(&mut self, window: &[f32]) -> AudioResult<f32>;

    /// Reset internal state (call when starting a new audio stream)
    fn reset(&mut self);

    /// Short name for logs and status
    fn name(&self) -> &'static str;
}

/// RMS at which the energy classifier reports certainty
const DEFAULT_FULL_SCALE_RMS: f32 = 0.02;

/// Energy-based classifier.
///
/// The window's RMS is scaled linearly so that `full_scale_rms` maps to 1.0;
/// with the default threshold of 0.5 anything louder than about -40 dBFS counts
/// as speech.
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    full_scale_rms: f32,
}

impl EnergyClassifier {
    pub fn new() -> Self {
        Self {
            full_scale_rms: DEFAULT_FULL_SCALE_RMS,
        }
    }

    pub fn with_full_scale(full_scale_rms: f32) -> Self {
        Self {
            full_scale_rms: full_scale_rms.max(f32::EPSILON),
        }
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn probability(&mut self, window: &[f32]) -> AudioResult<f32> {
        if window.is_empty() {
            return Ok(0.0);
        }
        let mean_square = window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32;
        Ok((mean_square.sqrt() / self.full_scale_rms).min(1.0))
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "energy"
    }
}
