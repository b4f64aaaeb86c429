//! G.711 μ-law companding and PCM helpers

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Compress one linear sample to μ-law
#[inline]
pub fn encode_sample(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    if pcm > CLIP {
        pcm = CLIP;
    }
    pcm += BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (pcm & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Expand one μ-law byte to a linear sample
#[inline]
pub fn decode_sample(byte: u8) -> i16 {
    let value = !byte as i32;
    let sign = value & 0x80;
    let exponent = (value >> 4) & 0x07;
    let mantissa = value & 0x0F;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// μ-law bytes to linear PCM, one sample per byte
pub fn to_linear(companded: &[u8]) -> Vec<i16> {
    companded.iter().map(|&b| decode_sample(b)).collect()
}

/// Linear PCM to μ-law bytes, one byte per sample
pub fn to_companded(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().map(|&s| encode_sample(s)).collect()
}

/// Serialize samples as little-endian bytes
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Parse little-endian bytes into samples; a trailing odd byte is ignored
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Normalize to [-1.0, 1.0)
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Scale back to i16 with clamping
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_encodes_to_0xff() {
        assert_eq!(encode_sample(0), 0xFF);
        assert_eq!(decode_sample(0xFF), 0);
    }

    #[test]
    fn test_known_values() {
        // Extremes of the law
        assert_eq!(encode_sample(i16::MAX), 0x80);
        assert_eq!(encode_sample(i16::MIN), 0x00);
        assert_eq!(decode_sample(0x80), 32124);
        assert_eq!(decode_sample(0x00), -32124);
    }

    #[test]
    fn test_length_is_preserved() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let pcm = to_linear(&bytes);
        assert_eq!(pcm.len(), 256);
        assert_eq!(to_companded(&pcm).len(), 256);
    }

    #[test]
    fn test_decode_then_encode_is_stable() {
        // Every μ-law code maps to a linear value that encodes back to itself,
        // except the negative zero code which collapses onto positive zero.
        for byte in 0..=255u8 {
            let reencoded = encode_sample(decode_sample(byte));
            if byte == 0x7F {
                assert_eq!(reencoded, 0xFF);
            } else {
                assert_eq!(reencoded, byte, "code {byte:#04x}");
            }
        }
    }

    #[test]
    fn test_sign_symmetry() {
        for sample in [100i16, 1000, 8000, 30000] {
            assert_eq!(decode_sample(encode_sample(sample)), -decode_sample(encode_sample(-sample)));
        }
    }

    #[test]
    fn test_pcm_bytes_little_endian() {
        let bytes = pcm_to_bytes(&[1, -2, 0x1234]);
        assert_eq!(bytes, vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
        assert_eq!(bytes_to_pcm(&bytes), vec![1, -2, 0x1234]);
        assert_eq!(bytes_to_pcm(&[0x01, 0x00, 0x07]), vec![1]);
    }

    #[test]
    fn test_float_conversion_clamps() {
        let samples = f32_to_i16(&[0.0, 1.5, -1.5, 0.5]);
        assert_eq!(samples, vec![0, 32767, -32768, 16384]);
        let floats = i16_to_f32(&[-32768, 0]);
        assert_eq!(floats, vec![-1.0, 0.0]);
    }
}
