//! Voice Activity Detection (VAD) module
//!
//! Detects when the caller starts and stops speaking. Audio is analysed in
//! 256-sample windows (32 ms at 8 kHz); a window's speech probability comes
//! from a [`SpeechClassifier`] and is smoothed into start/end events by a
//! consecutive-window hysteresis.
//!
//! # Feature Flag
//!
//! The default classifier is energy based. Building with `silero-vad` enables
//! the Silero ONNX model, which must be downloaded first with
//! `telephony-bridge init`.
//!
//! # Example
//!
//! ```rust,ignore
//! use telephony_bridge::core::vad::{VADConfig, create_vad};
//!
//! let mut vad = create_vad(VADConfig::default()).await;
//!
//! // 20ms telephony frames (160 samples at 8kHz)
//! let result = vad.process_chunk(&pcm_frame);
//! if result.speech_started {
//!     println!("Caller started speaking");
//! }
//! ```

#[cfg(feature = "silero-vad")]
pub mod assets;
pub mod classifier;
pub mod config;
pub mod detector;
#[cfg(feature = "silero-vad")]
pub mod silero;

pub use classifier::{EnergyClassifier, SpeechClassifier};
pub use config::{VAD_WINDOW_SAMPLES, VADBackend, VADConfig};
pub use detector::{VADResult, VADStats, VoiceActivityDetector};

#[cfg(feature = "silero-vad")]
pub use silero::SileroClassifier;

use tracing::warn;

/// Create a detector for the configured backend.
///
/// An invalid configuration or a classifier that cannot be loaded disables VAD
/// for the session instead of failing it.
pub async fn create_vad(config: VADConfig) -> VoiceActivityDetector {
    if let Err(e) = config.validate() {
        warn!("Invalid VAD configuration, VAD disabled: {}", e);
        return VoiceActivityDetector::disabled(config, Box::new(EnergyClassifier::new()));
    }

    match config.backend {
        VADBackend::Energy => VoiceActivityDetector::new(config, Box::new(EnergyClassifier::new())),
        VADBackend::Silero => create_silero(config).await,
    }
}

#[cfg(feature = "silero-vad")]
async fn create_silero(config: VADConfig) -> VoiceActivityDetector {
    if !config.enabled {
        return VoiceActivityDetector::disabled(config, Box::new(EnergyClassifier::new()));
    }
    match SileroClassifier::load(&config).await {
        Ok(classifier) => VoiceActivityDetector::new(config, Box::new(classifier)),
        Err(e) => {
            warn!("Silero VAD unavailable, VAD disabled: {}", e);
            VoiceActivityDetector::disabled(config, Box::new(EnergyClassifier::new()))
        }
    }
}

#[cfg(not(feature = "silero-vad"))]
async fn create_silero(config: VADConfig) -> VoiceActivityDetector {
    if config.enabled {
        warn!("Silero VAD requested but the `silero-vad` feature is not compiled in, VAD disabled");
    }
    VoiceActivityDetector::disabled(config, Box::new(EnergyClassifier::new()))
}
