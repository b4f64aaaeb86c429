pub mod audio;
pub mod interruption;
pub mod noise;
pub mod suppression;
pub mod vad;

// Re-export commonly used types for convenience
pub use audio::{AudioError, AudioFrame, AudioResult, SampleRate, TelephonyConverter};

pub use noise::{NoiseConfig, NoiseSettingsUpdate, NoiseSource, NoiseStatus};

pub use suppression::{NoiseSuppressor, SuppressionConfig, SuppressionState, SuppressionStatus};

pub use vad::{VADBackend, VADConfig, VADResult, VADStats, VoiceActivityDetector, create_vad};

pub use interruption::{InterruptionConfig, InterruptionDetector, InterruptionStats};
