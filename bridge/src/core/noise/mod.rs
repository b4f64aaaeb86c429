//! Background noise played under the agent's voice
//!
//! A noise asset is decoded once per session into μ-law bytes and then read
//! as an endless loop by [`NoiseSource`]. Decoding goes through an external
//! `ffmpeg` process so any compressed format it understands can be used;
//! plain 16-bit mono WAV files at the telephony rate are read directly.

pub mod asset;
pub mod source;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use asset::{NoiseAsset, NoiseDecoder};
pub use source::{NoiseSettingsUpdate, NoiseSource, NoiseStatus};

/// Background noise configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoiseConfig {
    /// Mix noise into agent audio
    pub enabled: bool,
    /// Asset name; resolved to `<folder>/<noise_type>.mp3`
    pub noise_type: String,
    /// Noise gain (0.0 - 10.0)
    pub volume: f32,
    /// Directory containing noise assets
    pub folder: PathBuf,
    /// Decoder binary
    pub decoder_path: String,
    /// Upper bound on a single decode (seconds)
    pub decode_timeout_secs: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            noise_type: "call-center".to_string(),
            volume: 0.15,
            folder: PathBuf::from("noise"),
            decoder_path: "ffmpeg".to_string(),
            decode_timeout_secs: 30,
        }
    }
}

impl NoiseConfig {
    /// Path of the asset for the configured noise type
    pub fn asset_path(&self) -> PathBuf {
        self.asset_path_for(&self.noise_type)
    }

    pub fn asset_path_for(&self, noise_type: &str) -> PathBuf {
        self.folder.join(format!("{noise_type}.mp3"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=10.0).contains(&self.volume) {
            return Err(format!(
                "Noise volume must be between 0.0 and 10.0, got {}",
                self.volume
            ));
        }
        if self.noise_type.trim().is_empty() {
            return Err("Noise type must not be empty".to_string());
        }
        if self.decode_timeout_secs == 0 {
            return Err("Noise decode timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}
