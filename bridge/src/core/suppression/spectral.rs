//! FFT spectral gate

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::collections::HashMap;
use std::sync::Arc;

use super::{NoiseProfile, NoiseReducer};
use crate::core::audio::{AudioError, AudioResult};

/// Analysis block (32 ms at 8 kHz)
const FFT_SIZE: usize = 256;

/// Standard deviations above the profile mean that count as signal
const N_STD_THRESHOLD: f32 = 1.5;

/// Multiple of the block's mean magnitude that counts as signal when no profile exists
const ADAPTIVE_THRESHOLD: f32 = 1.5;

/// Weight of the previous block's gain when smoothing the mask
const MASK_SMOOTHING: f32 = 0.5;

/// Attenuates frequency bins whose magnitude stays under a noise threshold.
///
/// With a profile, per-bin thresholds are `mean + 1.5 * std` of the profile's
/// magnitudes, measured on profile segments as long as the block being
/// filtered and zero-padded the same way. They are cached per profile
/// generation and block length. Without a profile, a single threshold is
/// derived from the block itself.
///
/// The per-bin gain is smoothed across consecutive blocks so the mask does
/// not jump at frame boundaries.
pub struct SpectralGate {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    cached_generation: Option<u64>,
    thresholds: HashMap<usize, Vec<f32>>,
    previous_gains: Option<Vec<f32>>,
}

impl SpectralGate {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            forward: planner.plan_fft_forward(FFT_SIZE),
            inverse: planner.plan_fft_inverse(FFT_SIZE),
            cached_generation: None,
            thresholds: HashMap::new(),
            previous_gains: None,
        }
    }

    fn spectrum(&self, block: &[f32]) -> Vec<Complex<f32>> {
        let mut buffer: Vec<Complex<f32>> = block
            .iter()
            .map(|&x| Complex { re: x, im: 0.0 })
            .chain(std::iter::repeat(Complex { re: 0.0, im: 0.0 }))
            .take(FFT_SIZE)
            .collect();
        self.forward.process(&mut buffer);
        buffer
    }

    fn profile_thresholds(&mut self, profile: &NoiseProfile, block_len: usize) -> Vec<f32> {
        if self.cached_generation != Some(profile.generation()) {
            self.thresholds.clear();
            self.cached_generation = Some(profile.generation());
        }
        if let Some(thresholds) = self.thresholds.get(&block_len) {
            return thresholds.clone();
        }

        let samples = profile.samples();
        let mut segments: Vec<&[f32]> = samples.chunks_exact(block_len).collect();
        if segments.is_empty() {
            segments = samples.chunks(block_len).collect();
        }
        let magnitudes: Vec<Vec<f32>> = segments
            .iter()
            .map(|segment| self.spectrum(segment).iter().map(|c| c.norm()).collect())
            .collect();

        let mut thresholds = vec![0.0f32; FFT_SIZE];
        if !magnitudes.is_empty() {
            let count = magnitudes.len() as f32;
            for (bin, threshold) in thresholds.iter_mut().enumerate() {
                let mean = magnitudes.iter().map(|m| m[bin]).sum::<f32>() / count;
                let variance = magnitudes
                    .iter()
                    .map(|m| (m[bin] - mean).powi(2))
                    .sum::<f32>()
                    / count;
                *threshold = mean + N_STD_THRESHOLD * variance.sqrt();
            }
        }

        self.thresholds.insert(block_len, thresholds.clone());
        thresholds
    }

    fn smooth(&mut self, targets: Vec<f32>) -> Vec<f32> {
        let gains = match &self.previous_gains {
            Some(previous) => previous
                .iter()
                .zip(targets.iter())
                .map(|(prev, target)| MASK_SMOOTHING * prev + (1.0 - MASK_SMOOTHING) * target)
                .collect(),
            None => targets,
        };
        self.previous_gains = Some(gains.clone());
        gains
    }
}

impl Default for SpectralGate {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseReducer for SpectralGate {
    fn reduce(
        &mut self,
        audio: &[f32],
        profile: Option<&NoiseProfile>,
        prop_decrease: f32,
    ) -> AudioResult<Vec<f32>> {
        if audio.iter().any(|s| !s.is_finite()) {
            return Err(AudioError::Reduction(
                "input contains non-finite samples".to_string(),
            ));
        }

        let attenuation = 1.0 - prop_decrease.clamp(0.0, 1.0);
        let scale = 1.0 / FFT_SIZE as f32;

        let mut output = Vec::with_capacity(audio.len());
        for block in audio.chunks(FFT_SIZE) {
            let mut spectrum = self.spectrum(block);
            let magnitudes: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();

            let thresholds = match profile {
                Some(profile) => self.profile_thresholds(profile, block.len()),
                None => {
                    let adaptive =
                        magnitudes.iter().sum::<f32>() / FFT_SIZE as f32 * ADAPTIVE_THRESHOLD;
                    vec![adaptive; FFT_SIZE]
                }
            };

            let targets: Vec<f32> = magnitudes
                .iter()
                .zip(thresholds.iter())
                .map(|(magnitude, threshold)| {
                    if magnitude <= threshold { attenuation } else { 1.0 }
                })
                .collect();
            let gains = self.smooth(targets);

            for (value, gain) in spectrum.iter_mut().zip(gains.iter()) {
                *value *= *gain;
            }

            self.inverse.process(&mut spectrum);
            output.extend(spectrum.iter().take(block.len()).map(|c| c.re * scale));
        }

        Ok(output)
    }

    fn reset(&mut self) {
        self.cached_generation = None;
        self.thresholds.clear();
        self.previous_gains = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, freq: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 8000.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn test_output_length_matches_input() {
        let mut gate = SpectralGate::new();
        for len in [0, 1, 160, 256, 300, 1000] {
            let out = gate.reduce(&tone(len, 440.0, 0.3), None, 0.8).unwrap();
            assert_eq!(out.len(), len);
        }
    }

    #[test]
    fn test_zero_reduction_is_near_identity() {
        let mut gate = SpectralGate::new();
        let input = tone(160, 300.0, 0.5);
        let out = gate.reduce(&input, None, 0.0).unwrap();
        for (a, b) in input.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_profile_attenuates_matching_noise() {
        let mut gate = SpectralGate::new();
        let block = tone(256, 1000.0, 0.1);
        let profile = NoiseProfile::new(block.repeat(10), 1);

        let out = gate.reduce(&block, Some(&profile), 1.0).unwrap();
        let energy_in: f32 = block.iter().map(|s| s * s).sum();
        let energy_out: f32 = out.iter().map(|s| s * s).sum();
        assert!(energy_out < energy_in * 0.1);
    }

    fn noise(len: usize, seed: u64, amplitude: f32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 40) as f32 / (1u64 << 24) as f32 - 0.5) * 2.0 * amplitude
            })
            .collect()
    }

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_telephony_frame_matching_profile_is_gated() {
        let mut gate = SpectralGate::new();
        let frame = noise(160, 3, 0.05);
        let profile = NoiseProfile::new(frame.repeat(25), 1);

        let out = gate.reduce(&frame, Some(&profile), 1.0).unwrap();
        assert_eq!(out.len(), 160);
        assert!(energy(&out) < energy(&frame) * 0.01);
    }

    #[test]
    fn test_thresholds_follow_block_length() {
        let mut gate = SpectralGate::new();
        let profile = NoiseProfile::new(noise(160 * 25, 11, 0.05), 1);

        let short = gate.profile_thresholds(&profile, 160);
        let full = gate.profile_thresholds(&profile, FFT_SIZE);
        let short_total: f32 = short.iter().sum();
        let full_total: f32 = full.iter().sum();

        // Zero-padded short blocks carry less energy per bin
        assert!(short_total < full_total);
        assert_eq!(gate.thresholds.len(), 2);
    }

    #[test]
    fn test_mask_is_smoothed_across_frames() {
        let background = noise(160, 5, 0.01);
        let profile = NoiseProfile::new(background.repeat(25), 1);
        let speech = tone(160, 1000.0, 0.5);

        let mut fresh = SpectralGate::new();
        let fresh_out = fresh.reduce(&speech, Some(&profile), 1.0).unwrap();

        let mut warmed = SpectralGate::new();
        warmed.reduce(&background, Some(&profile), 1.0).unwrap();
        let warmed_out = warmed.reduce(&speech, Some(&profile), 1.0).unwrap();

        assert!(energy(&fresh_out) > 0.0);
        assert!(energy(&warmed_out) < energy(&fresh_out) * 0.5);

        warmed.reset();
        let reset_out = warmed.reduce(&speech, Some(&profile), 1.0).unwrap();
        assert!((energy(&reset_out) - energy(&fresh_out)).abs() <= energy(&fresh_out) * 1e-4);
    }

    #[test]
    fn test_non_finite_input_is_an_error() {
        let mut gate = SpectralGate::new();
        assert!(gate.reduce(&[0.0, f32::NAN], None, 0.5).is_err());
    }
}
