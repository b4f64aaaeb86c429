//! Additive mixing of agent audio with background noise
//!
//! Inputs and output are μ-law. The secondary stream is tiled or truncated to
//! the primary's length, both are decoded, scaled, summed with saturation and
//! re-encoded. The output always has the primary's length.

use super::codec::{to_companded, to_linear};

/// Gain bounds accepted by the mixer
pub const MIN_GAIN: f32 = 0.0;
pub const MAX_GAIN: f32 = 10.0;

/// Mix two μ-law streams.
///
/// An empty primary returns the secondary unchanged and an empty secondary
/// returns the primary unchanged. Gains outside `[0, 10]` are clamped.
pub fn mix(primary: &[u8], secondary: &[u8], primary_gain: f32, secondary_gain: f32) -> Vec<u8> {
    if primary.is_empty() {
        return secondary.to_vec();
    }
    if secondary.is_empty() {
        return primary.to_vec();
    }

    let primary_pcm = to_linear(primary);
    let secondary_pcm = to_linear(secondary);
    to_companded(&mix_pcm(
        &primary_pcm,
        &secondary_pcm,
        primary_gain,
        secondary_gain,
    ))
}

/// Mix two linear streams with the same tiling and saturation rules as [`mix`]
pub fn mix_pcm(primary: &[i16], secondary: &[i16], primary_gain: f32, secondary_gain: f32) -> Vec<i16> {
    if primary.is_empty() {
        return secondary.to_vec();
    }
    if secondary.is_empty() {
        return primary.to_vec();
    }

    let primary_gain = clamp_gain(primary_gain);
    let secondary_gain = clamp_gain(secondary_gain);

    primary
        .iter()
        .zip(secondary.iter().cycle())
        .map(|(&p, &s)| {
            let sum = p as f32 * primary_gain + s as f32 * secondary_gain;
            sum.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

#[inline]
fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        return MIN_GAIN;
    }
    gain.clamp(MIN_GAIN, MAX_GAIN)
}
