//! Looping reader over a decoded noise asset

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::NoiseConfig;
use super::asset::{NoiseAsset, NoiseDecoder};
use crate::core::audio::TELEPHONY_SAMPLE_RATE;
use crate::core::audio::codec::{decode_sample, encode_sample};

/// Partial settings change; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoiseSettingsUpdate {
    pub enabled: Option<bool>,
    pub noise_type: Option<String>,
    pub volume: Option<f32>,
}

/// Snapshot of the source for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct NoiseStatus {
    pub enabled: bool,
    pub noise_type: String,
    pub volume: f32,
    pub loaded: bool,
    pub asset_len: usize,
    pub running: bool,
}

struct Inner {
    enabled: bool,
    noise_type: String,
    volume: f32,
    running: bool,
    asset: Option<NoiseAsset>,
    cursor: usize,
}

/// Endless background noise stream.
///
/// Reads always return exactly the number of bytes asked for, wrapping to the
/// start of the asset as often as needed. Settings and cursor share one lock.
pub struct NoiseSource {
    config: NoiseConfig,
    decoder: NoiseDecoder,
    inner: Mutex<Inner>,
}

impl NoiseSource {
    /// Create a source without loading an asset
    pub fn new(config: NoiseConfig) -> Self {
        let decoder = NoiseDecoder::new(
            config.decoder_path.clone(),
            Duration::from_secs(config.decode_timeout_secs),
        );
        let inner = Inner {
            enabled: config.enabled,
            noise_type: config.noise_type.clone(),
            volume: config.volume.clamp(0.0, 10.0),
            running: false,
            asset: None,
            cursor: 0,
        };
        Self {
            config,
            decoder,
            inner: Mutex::new(inner),
        }
    }

    /// Create a source around an already decoded asset
    pub fn with_asset(config: NoiseConfig, asset: NoiseAsset) -> Self {
        let source = Self::new(config);
        source.inner.lock().asset = Some(asset);
        source
    }

    /// Create a source and load the configured asset.
    ///
    /// A load failure disables the source for this session instead of failing.
    pub async fn load(config: NoiseConfig) -> Self {
        let source = Self::new(config);
        if source.is_enabled() {
            let noise_type = source.inner.lock().noise_type.clone();
            if !source.reload(&noise_type).await {
                source.inner.lock().enabled = false;
            }
        }
        source
    }

    /// Load the asset for `noise_type`, replacing the current one on success
    pub async fn reload(&self, noise_type: &str) -> bool {
        let path = self.config.asset_path_for(noise_type);
        match NoiseAsset::load(&path, TELEPHONY_SAMPLE_RATE, &self.decoder).await {
            Ok(asset) => {
                let mut inner = self.inner.lock();
                inner.asset = Some(asset);
                inner.noise_type = noise_type.to_string();
                inner.cursor = 0;
                true
            }
            Err(e) => {
                warn!(
                    "Background noise '{}' unavailable, continuing without it: {}",
                    noise_type, e
                );
                false
            }
        }
    }

    /// Next `size` bytes of raw μ-law noise
    pub fn next_chunk_raw(&self, size: usize) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        Self::read_chunk(&mut inner, size)
    }

    /// Next `size` bytes of noise with the configured volume applied
    pub fn next_chunk(&self, size: usize) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let volume = inner.volume;
        let raw = Self::read_chunk(&mut inner, size)?;
        drop(inner);

        Some(
            raw.into_iter()
                .map(|byte| {
                    let scaled = (decode_sample(byte) as f32 * volume)
                        .clamp(i16::MIN as f32, i16::MAX as f32);
                    encode_sample(scaled as i16)
                })
                .collect(),
        )
    }

    fn read_chunk(inner: &mut Inner, size: usize) -> Option<Vec<u8>> {
        if !inner.enabled {
            return None;
        }
        let asset = inner.asset.as_ref()?;
        let data = asset.bytes();
        if data.is_empty() {
            return None;
        }

        let mut chunk = Vec::with_capacity(size);
        let mut cursor = inner.cursor % data.len();
        while chunk.len() < size {
            let take = (size - chunk.len()).min(data.len() - cursor);
            chunk.extend_from_slice(&data[cursor..cursor + take]);
            cursor = (cursor + take) % data.len();
        }
        inner.cursor = cursor;

        Some(chunk)
    }

    /// Apply a settings change. Returns the new noise type when it changed so the
    /// caller can [`reload`](Self::reload) the asset.
    pub fn update_settings(&self, update: NoiseSettingsUpdate) -> Option<String> {
        let mut inner = self.inner.lock();
        if let Some(enabled) = update.enabled {
            inner.enabled = enabled;
        }
        if let Some(volume) = update.volume {
            inner.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 10.0) };
        }

        let changed_type = update
            .noise_type
            .filter(|noise_type| *noise_type != inner.noise_type);

        info!(
            "Noise settings updated: enabled={}, volume={:.2}, type={}",
            inner.enabled,
            inner.volume,
            changed_type.as_deref().unwrap_or(inner.noise_type.as_str())
        );

        changed_type
    }

    pub fn start(&self) {
        self.inner.lock().running = true;
        debug!("Background noise started");
    }

    pub fn stop(&self) {
        self.inner.lock().running = false;
        debug!("Background noise stopped");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    pub fn status(&self) -> NoiseStatus {
        let inner = self.inner.lock();
        NoiseStatus {
            enabled: inner.enabled,
            noise_type: inner.noise_type.clone(),
            volume: inner.volume,
            loaded: inner.asset.is_some(),
            asset_len: inner.asset.as_ref().map(NoiseAsset::len).unwrap_or(0),
            running: inner.running,
        }
    }

    /// Whether the configured decoder can be run on this host
    pub async fn decoder_available(&self) -> bool {
        self.decoder.is_available().await
    }
}
