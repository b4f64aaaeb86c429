//! Audio primitives shared by both directions of the bridge
//!
//! The telephony leg carries 8 kHz mono G.711 μ-law in 20 ms frames (160 bytes).
//! The room leg carries 48 kHz mono linear PCM. Everything in this module is
//! synchronous and allocation-light so it can run inside the per-frame loops.
//!
//! # Modules
//! - `codec`: μ-law companding and PCM byte helpers
//! - `resampler`: room-rate to telephony-rate conversion
//! - `mixer`: additive mixing of two μ-law streams

pub mod codec;
pub mod mixer;
pub mod resampler;

use thiserror::Error;

pub use codec::{bytes_to_pcm, f32_to_i16, i16_to_f32, pcm_to_bytes, to_companded, to_linear};
pub use mixer::{mix, mix_pcm};
pub use resampler::TelephonyConverter;

/// Telephony sample rate (Hz)
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Room sample rate (Hz)
pub const ROOM_SAMPLE_RATE: u32 = 48000;

/// Frame cadence used on both legs
pub const FRAME_DURATION_MS: u64 = 20;

/// μ-law bytes per 20 ms telephony frame
pub const TELEPHONY_FRAME_BYTES: usize = 160;

/// Samples per 20 ms room frame
pub const ROOM_FRAME_SAMPLES: usize = 960;

/// Errors raised by the audio stages
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Resampler error: {0}")]
    Resample(String),

    #[error("Unexpected sample rate: expected {expected} Hz, got {actual} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Decoder unavailable: {0}")]
    DecoderUnavailable(String),

    #[error("Decoder failed: {0}")]
    DecoderFailed(String),

    #[error("Decoder timed out after {0}s")]
    DecoderTimeout(u64),

    #[error("Noise reduction failed: {0}")]
    Reduction(String),

    #[error("Classifier failed: {0}")]
    Classifier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Sample-rate tag carried by every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    /// 8000 Hz
    Telephony,
    /// 48000 Hz
    Room,
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Telephony => TELEPHONY_SAMPLE_RATE,
            SampleRate::Room => ROOM_SAMPLE_RATE,
        }
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            TELEPHONY_SAMPLE_RATE => Some(SampleRate::Telephony),
            ROOM_SAMPLE_RATE => Some(SampleRate::Room),
            _ => None,
        }
    }
}

impl std::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// A block of mono 16-bit PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub samples_per_channel: usize,
    pub num_channels: u32,
    pub sample_rate: SampleRate,
}

impl AudioFrame {
    /// Build a mono frame from samples at the given rate
    pub fn mono(samples: Vec<i16>, sample_rate: SampleRate) -> Self {
        let samples_per_channel = samples.len();
        Self {
            samples,
            samples_per_channel,
            num_channels: 1,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the frame in milliseconds
    pub fn duration_ms(&self) -> f32 {
        self.samples_per_channel as f32 * 1000.0 / self.sample_rate.hz() as f32
    }
}
