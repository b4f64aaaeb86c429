//! Noise suppression for caller audio
//!
//! The stage learns a noise profile from the first frames of the call and then
//! denoises every later frame against it. While learning, frames pass through
//! untouched. In adaptive mode there is no learning phase: each frame is
//! denoised against its own statistics with a gentler reduction.
//!
//! The actual denoiser sits behind [`NoiseReducer`]; [`SpectralGate`] is the
//! built-in FFT implementation.

pub mod spectral;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::core::audio::{AudioResult, f32_to_i16, i16_to_f32};

pub use spectral::SpectralGate;

/// Frames kept for profile learning
pub const PROFILE_BUFFER_FRAMES: usize = 50;

/// Reduction scale applied in adaptive mode
const ADAPTIVE_REDUCTION_SCALE: f32 = 0.75;

/// Errors logged before the stage goes quiet
const MAX_LOGGED_ERRORS: u64 = 5;

/// Noise suppression configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuppressionConfig {
    pub enabled: bool,
    /// Learn a fixed profile from the start of the call
    pub stationary: bool,
    /// Reduction strength (0.0 - 1.0)
    pub prop_decrease: f32,
    /// Frames used to learn the profile
    pub learning_frames: usize,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stationary: true,
            prop_decrease: 0.8,
            learning_frames: 25,
        }
    }
}

impl SuppressionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.prop_decrease) {
            return Err(format!(
                "Noise cancellation prop_decrease must be between 0.0 and 1.0, got {}",
                self.prop_decrease
            ));
        }
        if self.learning_frames == 0 || self.learning_frames > PROFILE_BUFFER_FRAMES {
            return Err(format!(
                "Noise cancellation learning_frames must be between 1 and {}, got {}",
                PROFILE_BUFFER_FRAMES, self.learning_frames
            ));
        }
        Ok(())
    }
}

/// Frozen noise statistics source
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseProfile {
    samples: Vec<f32>,
    generation: u64,
}

impl NoiseProfile {
    pub fn new(samples: Vec<f32>, generation: u64) -> Self {
        Self {
            samples,
            generation,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Changes every time a profile is rebuilt, so reducers can cache derived data
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Black-box denoiser
pub trait NoiseReducer: Send {
    /// Denoise `audio` (normalized f32). Without a profile the reducer estimates
    /// noise from `audio` itself.
    fn reduce(
        &mut self,
        audio: &[f32],
        profile: Option<&NoiseProfile>,
        prop_decrease: f32,
    ) -> AudioResult<Vec<f32>>;

    /// Forget any state carried between frames
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionState {
    Learning,
    Ready,
}

/// Snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SuppressionStatus {
    pub enabled: bool,
    pub stationary: bool,
    pub prop_decrease: f32,
    pub learning_frames: usize,
    pub frames_processed: u64,
    pub total_processed: u64,
    pub errors: u64,
    pub profile_ready: bool,
}

impl std::fmt::Display for SuppressionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Noise suppression: {} frames, profile_ready={}, errors={}",
            self.total_processed, self.profile_ready, self.errors
        )
    }
}

/// Noise suppression stage for 8 kHz caller PCM
pub struct NoiseSuppressor {
    config: SuppressionConfig,
    reducer: Box<dyn NoiseReducer>,
    state: SuppressionState,
    buffer: VecDeque<Vec<f32>>,
    profile: Option<NoiseProfile>,
    generation: u64,
    frames_processed: u64,
    total_processed: u64,
    errors: u64,
}

impl NoiseSuppressor {
    /// Create a suppressor backed by the spectral gate
    pub fn new(config: SuppressionConfig) -> Self {
        Self::with_reducer(config, Box::new(SpectralGate::new()))
    }

    pub fn with_reducer(config: SuppressionConfig, reducer: Box<dyn NoiseReducer>) -> Self {
        if config.enabled {
            info!(
                "Noise suppression enabled: stationary={}, prop_decrease={:.2}, learning_frames={}",
                config.stationary, config.prop_decrease, config.learning_frames
            );
        }
        Self {
            config,
            reducer,
            state: SuppressionState::Learning,
            buffer: VecDeque::with_capacity(PROFILE_BUFFER_FRAMES),
            profile: None,
            generation: 0,
            frames_processed: 0,
            total_processed: 0,
            errors: 0,
        }
    }

    /// Process one frame. Never fails: on any error the input is returned.
    pub fn process(&mut self, pcm: &[i16]) -> Vec<i16> {
        if !self.config.enabled || pcm.is_empty() {
            return pcm.to_vec();
        }

        self.total_processed += 1;
        let audio = i16_to_f32(pcm);

        let result = if self.config.stationary {
            self.process_stationary(audio)
        } else {
            self.reducer.reduce(
                &audio,
                None,
                self.config.prop_decrease * ADAPTIVE_REDUCTION_SCALE,
            )
            .map(Some)
        };

        match result {
            Ok(Some(reduced)) => f32_to_i16(&reduced),
            Ok(None) => pcm.to_vec(),
            Err(e) => {
                self.errors += 1;
                if self.errors <= MAX_LOGGED_ERRORS {
                    warn!("Noise suppression failed, passing frame through: {}", e);
                }
                pcm.to_vec()
            }
        }
    }

    /// `Ok(None)` means the frame was consumed for learning and passes through
    fn process_stationary(&mut self, audio: Vec<f32>) -> AudioResult<Option<Vec<f32>>> {
        if self.state == SuppressionState::Learning {
            self.frames_processed += 1;
            if self.buffer.len() == PROFILE_BUFFER_FRAMES {
                self.buffer.pop_front();
            }
            self.buffer.push_back(audio);

            if self.frames_processed as usize >= self.config.learning_frames {
                self.freeze_profile();
            }
            return Ok(None);
        }

        let profile = self.profile.as_ref();
        self.reducer
            .reduce(&audio, profile, self.config.prop_decrease)
            .map(Some)
    }

    fn freeze_profile(&mut self) {
        let samples: Vec<f32> = self.buffer.iter().flatten().copied().collect();
        self.generation += 1;
        info!(
            "Noise profile learned from {} frames ({} samples)",
            self.buffer.len(),
            samples.len()
        );
        self.profile = Some(NoiseProfile::new(samples, self.generation));
        self.state = SuppressionState::Ready;
    }

    /// Drop the learned profile and start learning again
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.profile = None;
        self.frames_processed = 0;
        self.state = SuppressionState::Learning;
        self.reducer.reset();
        debug!("Noise suppression reset");
    }

    pub fn state(&self) -> SuppressionState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn status(&self) -> SuppressionStatus {
        SuppressionStatus {
            enabled: self.config.enabled,
            stationary: self.config.stationary,
            prop_decrease: self.config.prop_decrease,
            learning_frames: self.config.learning_frames,
            frames_processed: self.frames_processed,
            total_processed: self.total_processed,
            errors: self.errors,
            profile_ready: self.profile.is_some(),
        }
    }
}
