//! Audio Test Fixtures
//!
//! Programmatically generated audio, so tests need no files on disk.
//!
//! Audio formats:
//! - Telephony: 8kHz, μ-law, mono, 160-byte (20ms) frames
//! - Room: 48kHz, 16-bit signed PCM, mono, 960-sample (20ms) frames

use std::f32::consts::PI;

use telephony_bridge::core::audio::{
    AudioFrame, ROOM_FRAME_SAMPLES, ROOM_SAMPLE_RATE, SampleRate, TELEPHONY_FRAME_BYTES,
    TELEPHONY_SAMPLE_RATE, to_companded,
};

/// Generate silence (zeros)
pub fn generate_silence(duration_samples: usize) -> Vec<i16> {
    vec![0i16; duration_samples]
}

/// Generate a sine wave tone at `sample_rate`; `amplitude` is 0.0 - 1.0
pub fn generate_sine_wave(
    duration_samples: usize,
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    let angular_freq = 2.0 * PI * frequency / sample_rate as f32;

    (0..duration_samples)
        .map(|i| ((angular_freq * i as f32).sin() * max_amplitude) as i16)
        .collect()
}

/// Generate white noise with specified amplitude (0.0 - 1.0)
pub fn generate_white_noise(duration_samples: usize, amplitude: f32) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;

    // Deterministic LCG so runs are reproducible
    let mut state: u64 = 12345;
    (0..duration_samples)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            let random = ((state >> 16) & 0x7FFF) as f32 / 0x7FFF as f32;
            ((random * 2.0 - 1.0) * max_amplitude) as i16
        })
        .collect()
}

/// One 20ms telephony frame of a loud 440 Hz tone
pub fn telephony_tone_frame() -> Vec<u8> {
    to_companded(&generate_sine_wave(
        TELEPHONY_FRAME_BYTES,
        440.0,
        0.4,
        TELEPHONY_SAMPLE_RATE,
    ))
}

/// One 20ms telephony frame of silence
pub fn telephony_silence_frame() -> Vec<u8> {
    to_companded(&generate_silence(TELEPHONY_FRAME_BYTES))
}

/// `count` consecutive 20ms room frames of a 440 Hz tone
pub fn room_tone_frames(count: usize) -> Vec<AudioFrame> {
    let samples = generate_sine_wave(ROOM_FRAME_SAMPLES * count, 440.0, 0.4, ROOM_SAMPLE_RATE);
    samples
        .chunks(ROOM_FRAME_SAMPLES)
        .map(|chunk| AudioFrame::mono(chunk.to_vec(), SampleRate::Room))
        .collect()
}

/// RMS of PCM samples on the 16-bit scale
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}
