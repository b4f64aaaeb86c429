//! Windowed voice activity detector with hysteresis

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::classifier::SpeechClassifier;
use super::config::VADConfig;

/// Classifier errors logged before the detector goes quiet
const MAX_LOGGED_ERRORS: u64 = 5;

/// Result of VAD processing for one chunk of caller audio
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VADResult {
    /// Whether VAD ran at all
    pub enabled: bool,
    /// Whether the last analysed window contains speech
    pub is_speech: bool,
    /// Speech probability of the last analysed window (0.0 - 1.0)
    pub confidence: f32,
    /// Silence to speech transition happened on this chunk
    pub speech_started: bool,
    /// Speech to silence transition happened on this chunk
    pub speech_ended: bool,
    /// Caller is considered to be speaking after this chunk
    pub user_speaking: bool,
}

impl VADResult {
    fn neutral(enabled: bool, user_speaking: bool) -> Self {
        Self {
            enabled,
            user_speaking,
            ..Default::default()
        }
    }
}

/// Voice activity detector for 8 kHz caller audio.
///
/// Samples accumulate in a buffer; every full window is classified and fed
/// through a consecutive-window hysteresis. Chunks that do not complete a
/// window return a neutral result.
pub struct VoiceActivityDetector {
    config: VADConfig,
    classifier: Box<dyn SpeechClassifier>,
    buffer: Vec<f32>,
    is_speaking: bool,
    speech_windows: u32,
    silence_windows: u32,
    total_windows: u64,
    total_speech_windows: u64,
    speech_segments: u64,
    errors: u64,
}

impl VoiceActivityDetector {
    pub fn new(config: VADConfig, classifier: Box<dyn SpeechClassifier>) -> Self {
        if config.enabled {
            info!(
                "VAD initialized: backend={}, threshold={:.2}, speech_frames={}, silence_frames={}",
                classifier.name(),
                config.threshold,
                config.speech_threshold_frames,
                config.silence_threshold_frames
            );
        }
        Self {
            buffer: Vec::with_capacity(config.frame_size * 2),
            config,
            classifier,
            is_speaking: false,
            speech_windows: 0,
            silence_windows: 0,
            total_windows: 0,
            total_speech_windows: 0,
            speech_segments: 0,
            errors: 0,
        }
    }

    /// A detector that never runs
    pub fn disabled(config: VADConfig, classifier: Box<dyn SpeechClassifier>) -> Self {
        Self::new(
            VADConfig {
                enabled: false,
                ..config
            },
            classifier,
        )
    }

    /// Analyse one chunk of 16-bit PCM
    pub fn process_chunk(&mut self, pcm: &[i16]) -> VADResult {
        if !self.config.enabled {
            return VADResult::neutral(false, false);
        }

        self.buffer.extend(pcm.iter().map(|&s| s as f32 / 32768.0));

        let window_size = self.config.frame_size;
        if self.buffer.len() < window_size {
            return VADResult::neutral(true, self.is_speaking);
        }

        let mut result = VADResult::neutral(true, self.is_speaking);
        while self.buffer.len() >= window_size {
            let window: Vec<f32> = self.buffer.drain(..window_size).collect();
            result = match self.classifier.probability(&window) {
                Ok(probability) => self.update(probability),
                Err(e) => {
                    self.errors += 1;
                    if self.errors <= MAX_LOGGED_ERRORS {
                        warn!("VAD classifier error: {}", e);
                    }
                    VADResult::neutral(true, self.is_speaking)
                }
            };
        }

        result
    }

    fn update(&mut self, probability: f32) -> VADResult {
        self.total_windows += 1;
        let is_speech = probability >= self.config.threshold;

        if is_speech {
            self.speech_windows += 1;
            self.silence_windows = 0;
            self.total_speech_windows += 1;
        } else {
            self.silence_windows += 1;
            self.speech_windows = 0;
        }

        let mut speech_started = false;
        let mut speech_ended = false;

        if !self.is_speaking && self.speech_windows >= self.config.speech_threshold_frames {
            self.is_speaking = true;
            self.speech_segments += 1;
            speech_started = true;
            debug!(
                "Speech started after {} windows ({:.0}ms)",
                self.speech_windows,
                self.speech_windows as f32 * self.config.frame_duration_ms()
            );
        } else if self.is_speaking && self.silence_windows >= self.config.silence_threshold_frames {
            self.is_speaking = false;
            speech_ended = true;
            debug!(
                "Speech ended after {} silence windows ({:.0}ms)",
                self.silence_windows,
                self.silence_windows as f32 * self.config.frame_duration_ms()
            );
        }

        trace!(
            "VAD window {}: prob={:.3}, speech={}, speaking={}",
            self.total_windows, probability, is_speech, self.is_speaking
        );

        VADResult {
            enabled: true,
            is_speech,
            confidence: probability,
            speech_started,
            speech_ended,
            user_speaking: self.is_speaking,
        }
    }

    /// Reset the detector state
    pub fn reset(&mut self) {
        self.classifier.reset();
        self.buffer.clear();
        self.is_speaking = false;
        self.speech_windows = 0;
        self.silence_windows = 0;
        debug!("VAD state reset");
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check if currently speaking
    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Get the configuration
    pub fn config(&self) -> &VADConfig {
        &self.config
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Get statistics about VAD activity
    pub fn stats(&self) -> VADStats {
        let speech_ratio = if self.total_windows > 0 {
            self.total_speech_windows as f32 / self.total_windows as f32
        } else {
            0.0
        };

        VADStats {
            enabled: self.config.enabled,
            backend: self.classifier.name(),
            threshold: self.config.threshold,
            total_windows: self.total_windows,
            total_speech_windows: self.total_speech_windows,
            speech_ratio,
            speech_segments: self.speech_segments,
            errors: self.errors,
            currently_speaking: self.is_speaking,
            buffered_samples: self.buffer.len(),
        }
    }
}

/// Statistics about VAD activity
#[derive(Debug, Clone, Serialize)]
pub struct VADStats {
    pub enabled: bool,
    pub backend: &'static str,
    pub threshold: f32,
    /// Total windows analysed
    pub total_windows: u64,
    /// Windows classified as speech
    pub total_speech_windows: u64,
    /// Ratio of speech windows to total windows
    pub speech_ratio: f32,
    /// Number of speech_started events
    pub speech_segments: u64,
    pub errors: u64,
    pub currently_speaking: bool,
    pub buffered_samples: usize,
}

impl std::fmt::Display for VADStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VAD Stats: {} windows ({} speech, {:.1}% ratio), {} segments, {} errors",
            self.total_windows,
            self.total_speech_windows,
            self.speech_ratio * 100.0,
            self.speech_segments,
            self.errors
        )
    }
}
