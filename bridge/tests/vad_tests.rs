//! Integration tests for the caller-side processing stages
//!
//! VAD, noise suppression and interruption detection fed with generated
//! telephony audio in 20ms frames.

mod fixtures;

use std::time::{Duration, Instant};

use fixtures::*;
use telephony_bridge::core::audio::TELEPHONY_FRAME_BYTES;
use telephony_bridge::core::vad::{EnergyClassifier, VADConfig, VoiceActivityDetector, create_vad};
use telephony_bridge::core::{
    InterruptionConfig, InterruptionDetector, NoiseSuppressor, SuppressionConfig, SuppressionState,
    VADBackend,
};

fn energy_vad() -> VoiceActivityDetector {
    VoiceActivityDetector::new(VADConfig::default(), Box::new(EnergyClassifier::new()))
}

fn tone(frames: usize) -> Vec<i16> {
    generate_sine_wave(TELEPHONY_FRAME_BYTES * frames, 300.0, 0.3, 8000)
}

#[test]
fn test_silence_then_speech_then_silence() {
    let mut vad = energy_vad();
    let mut started = 0;
    let mut ended = 0;

    let audio: Vec<i16> = [generate_silence(1600), tone(20), generate_silence(8000)].concat();
    for frame in audio.chunks(TELEPHONY_FRAME_BYTES) {
        let result = vad.process_chunk(frame);
        started += result.speech_started as u32;
        ended += result.speech_ended as u32;
    }

    assert_eq!(started, 1);
    assert_eq!(ended, 1);
    let stats = vad.stats();
    assert_eq!(stats.speech_segments, 1);
    assert!(!stats.currently_speaking);
    assert!(stats.speech_ratio > 0.0 && stats.speech_ratio < 1.0);
}

#[test]
fn test_disabled_vad_is_neutral() {
    let config = VADConfig {
        enabled: false,
        ..Default::default()
    };
    let mut vad = VoiceActivityDetector::disabled(config, Box::new(EnergyClassifier::new()));
    for frame in tone(10).chunks(TELEPHONY_FRAME_BYTES) {
        let result = vad.process_chunk(frame);
        assert!(!result.enabled);
        assert!(!result.is_speech);
    }
}

#[tokio::test]
async fn test_silero_without_model_never_fails_the_call() {
    let config = VADConfig {
        backend: VADBackend::Silero,
        model_path: Some("/nonexistent/silero_vad.onnx".into()),
        ..Default::default()
    };
    let mut vad = create_vad(config).await;

    assert!(!vad.is_enabled());
    let result = vad.process_chunk(&tone(1));
    assert!(!result.is_speech);
}

#[test]
fn test_suppression_keeps_frame_length() {
    let mut suppressor = NoiseSuppressor::new(SuppressionConfig::default());
    let noise = generate_white_noise(TELEPHONY_FRAME_BYTES * 40, 0.02);

    for frame in noise.chunks(TELEPHONY_FRAME_BYTES) {
        assert_eq!(suppressor.process(frame).len(), TELEPHONY_FRAME_BYTES);
    }
    assert!(suppressor.status().total_processed >= 40);
}

#[test]
fn test_suppression_learns_profile_then_reduces() {
    let config = SuppressionConfig::default();
    let learning = config.learning_frames;
    let mut suppressor = NoiseSuppressor::new(config);
    let noise = generate_white_noise(TELEPHONY_FRAME_BYTES * (learning + 5), 0.05);

    for (i, frame) in noise.chunks(TELEPHONY_FRAME_BYTES).enumerate() {
        let out = suppressor.process(frame);
        if i < learning {
            assert_eq!(out, frame, "learning frames pass through");
        }
    }

    assert_eq!(suppressor.state(), SuppressionState::Ready);
    assert!(suppressor.status().profile_ready);
}

#[test]
fn test_interruption_needs_agent_speech_and_respects_cooldown() {
    let mut vad = energy_vad();
    let mut detector = InterruptionDetector::new(InterruptionConfig::default());
    let start = Instant::now();

    let mut fired = 0;
    for (i, frame) in tone(40).chunks(TELEPHONY_FRAME_BYTES).enumerate() {
        let result = vad.process_chunk(frame);
        let now = start + Duration::from_millis(20 * i as u64);
        fired += detector.check_interruption(&result, true, now) as u32;
    }

    // 800ms of speech stays within one cooldown window
    assert_eq!(fired, 1);
    let stats = detector.stats();
    assert_eq!(stats.interruption_count, 1);
    assert!(stats.total_checks > 0);
}
