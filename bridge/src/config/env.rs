//! Configuration from environment variables (`.env` is loaded by `main`)

use std::path::PathBuf;

use super::utils::{env_bool, env_parse, env_var, env_var_any};
use super::{
    BridgeConfig, DEFAULT_AGENT_NAME, DEFAULT_PARTICIPANT_NAME, DEFAULT_REJECT_MESSAGE,
    LiveKitConfig, TimeoutConfig,
};
use crate::core::{InterruptionConfig, NoiseConfig, SuppressionConfig, VADBackend, VADConfig};
use crate::errors::ConfigError;

/// Build a configuration from environment variables with defaults
pub(crate) fn load_from_env() -> Result<BridgeConfig, ConfigError> {
    let cache_path = env_var("CACHE_PATH").map(PathBuf::from);

    let livekit = LiveKitConfig {
        url: env_var("LIVEKIT_URL").unwrap_or_else(|| "ws://localhost:7880".to_string()),
        api_key: env_var("LIVEKIT_API_KEY"),
        api_secret: env_var("LIVEKIT_API_SECRET"),
        participant_name: env_var("PARTICIPANT_NAME")
            .unwrap_or_else(|| DEFAULT_PARTICIPANT_NAME.to_string()),
    };

    let noise_defaults = NoiseConfig::default();
    let noise = NoiseConfig {
        enabled: env_bool("BG_NOISE_ENABLED", noise_defaults.enabled)?,
        noise_type: env_var("NOISE_TYPE").unwrap_or(noise_defaults.noise_type),
        volume: env_parse("NOISE_VOLUME", noise_defaults.volume)?,
        folder: env_var("NOISE_FOLDER")
            .map(PathBuf::from)
            .unwrap_or(noise_defaults.folder),
        decoder_path: env_var("FFMPEG_PATH").unwrap_or(noise_defaults.decoder_path),
        decode_timeout_secs: noise_defaults.decode_timeout_secs,
    };

    let vad_defaults = VADConfig::default();
    let vad = VADConfig {
        enabled: env_bool("VAD_ENABLED", vad_defaults.enabled)?,
        backend: env_parse::<VADBackend>("VAD_BACKEND", vad_defaults.backend)?,
        threshold: env_parse("VAD_THRESHOLD", vad_defaults.threshold)?,
        speech_threshold_frames: env_parse(
            "VAD_SPEECH_FRAMES",
            vad_defaults.speech_threshold_frames,
        )?,
        silence_threshold_frames: env_parse(
            "VAD_SILENCE_FRAMES",
            vad_defaults.silence_threshold_frames,
        )?,
        model_path: env_var("VAD_MODEL_PATH").map(PathBuf::from),
        cache_path: cache_path.clone(),
        ..vad_defaults
    };

    let suppression_defaults = SuppressionConfig::default();
    let suppression = SuppressionConfig {
        enabled: env_bool("NOISE_CANCELLATION_ENABLED", suppression_defaults.enabled)?,
        stationary: env_bool("NC_STATIONARY", suppression_defaults.stationary)?,
        prop_decrease: env_parse("NC_PROP_DECREASE", suppression_defaults.prop_decrease)?,
        learning_frames: env_parse("NC_LEARNING_FRAMES", suppression_defaults.learning_frames)?,
    };

    let interruption_defaults = InterruptionConfig::default();
    let interruption = InterruptionConfig {
        enabled: env_bool(
            "INTERRUPTION_DETECTION_ENABLED",
            interruption_defaults.enabled,
        )?,
        cooldown_ms: env_parse("INTERRUPTION_COOLDOWN_MS", interruption_defaults.cooldown_ms)?,
        signal_agent: env_bool(
            "INTERRUPTION_SIGNAL_AGENT",
            interruption_defaults.signal_agent,
        )?,
    };

    Ok(BridgeConfig {
        host: env_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env_parse("PORT", 8765)?,
        livekit,
        default_agent_name: env_var("DEFAULT_AGENT_NAME")
            .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
        env_agent_name: env_var("AGENT_NAME"),
        accept_incoming_calls: env_bool("ACCEPT_INCOMING_CALLS", true)?,
        reject_message: env_var_any(&["REJECT_CALL_MESSAGE", "REJECT_MESSAGE"])
            .unwrap_or_else(|| DEFAULT_REJECT_MESSAGE.to_string()),
        backend_api_url: env_var("INCOMING_CALL_AGENT_BACKEND_API"),
        noise,
        vad,
        suppression,
        interruption,
        timeouts: TimeoutConfig::default(),
        cache_path,
    })
}
