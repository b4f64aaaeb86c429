//! Health endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::core::noise::NoiseDecoder;
use crate::state::AppState;

/// `GET /` - service status and the audio settings new calls will use
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let decoder = NoiseDecoder::new(
        config.noise.decoder_path.clone(),
        Duration::from_secs(config.noise.decode_timeout_secs),
    );
    let decoder_available = decoder.is_available().await;

    Json(json!({
        "status": "ok",
        "service": "telephony-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "accept_incoming_calls": config.accept_incoming_calls,
        "active_calls": state.active_calls(),
        "background_noise": {
            "enabled": config.noise.enabled,
            "type": config.noise.noise_type,
            "volume": config.noise.volume,
            "decoder_available": decoder_available,
        },
        "vad": {
            "enabled": config.vad.enabled,
            "backend": config.vad.backend.to_string(),
            "threshold": config.vad.threshold,
            "speech_frames": config.vad.speech_threshold_frames,
            "silence_frames": config.vad.silence_threshold_frames,
        },
        "noise_cancellation": {
            "enabled": config.suppression.enabled,
            "stationary": config.suppression.stationary,
            "prop_decrease": config.suppression.prop_decrease,
            "learning_frames": config.suppression.learning_frames,
        },
        "interruption": {
            "enabled": config.interruption.enabled,
            "cooldown_ms": config.interruption.cooldown_ms,
            "signal_agent": config.interruption.signal_agent,
        },
    }))
}
