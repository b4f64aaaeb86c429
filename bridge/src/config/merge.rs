//! Layering YAML values on top of the environment configuration

use std::path::PathBuf;
use std::time::Duration;

use super::BridgeConfig;
use super::env::load_from_env;
use super::yaml::YamlConfig;
use crate::core::VADBackend;
use crate::errors::ConfigError;

/// Environment configuration with `yaml` applied on top
pub(crate) fn merge_config(yaml: Option<YamlConfig>) -> Result<BridgeConfig, ConfigError> {
    let mut config = load_from_env()?;
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml)?;
    }
    Ok(config)
}

fn apply_yaml(config: &mut BridgeConfig, yaml: YamlConfig) -> Result<(), ConfigError> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
    }

    if let Some(livekit) = yaml.livekit {
        if let Some(url) = livekit.url {
            config.livekit.url = url;
        }
        if livekit.api_key.is_some() {
            config.livekit.api_key = livekit.api_key;
        }
        if livekit.api_secret.is_some() {
            config.livekit.api_secret = livekit.api_secret;
        }
        if let Some(name) = livekit.participant_name {
            config.livekit.participant_name = name;
        }
    }

    if let Some(agent) = yaml.agent {
        if agent.name.is_some() {
            config.env_agent_name = agent.name;
        }
        if let Some(default_name) = agent.default_name {
            config.default_agent_name = default_name;
        }
    }

    if let Some(calls) = yaml.calls {
        if let Some(accept) = calls.accept_incoming {
            config.accept_incoming_calls = accept;
        }
        if let Some(message) = calls.reject_message {
            config.reject_message = message;
        }
        if calls.backend_api_url.is_some() {
            config.backend_api_url = calls.backend_api_url;
        }
    }

    if let Some(noise) = yaml.noise {
        let target = &mut config.noise;
        if let Some(enabled) = noise.enabled {
            target.enabled = enabled;
        }
        if let Some(noise_type) = noise.noise_type {
            target.noise_type = noise_type;
        }
        if let Some(volume) = noise.volume {
            target.volume = volume;
        }
        if let Some(folder) = noise.folder {
            target.folder = PathBuf::from(folder);
        }
        if let Some(decoder) = noise.decoder_path {
            target.decoder_path = decoder;
        }
        if let Some(timeout) = noise.decode_timeout_secs {
            target.decode_timeout_secs = timeout;
        }
    }

    if let Some(vad) = yaml.vad {
        let target = &mut config.vad;
        if let Some(enabled) = vad.enabled {
            target.enabled = enabled;
        }
        if let Some(backend) = vad.backend {
            target.backend = backend.parse::<VADBackend>().map_err(ConfigError::Invalid)?;
        }
        if let Some(threshold) = vad.threshold {
            target.threshold = threshold;
        }
        if let Some(frames) = vad.speech_frames {
            target.speech_threshold_frames = frames;
        }
        if let Some(frames) = vad.silence_frames {
            target.silence_threshold_frames = frames;
        }
        if let Some(path) = vad.model_path {
            target.model_path = Some(PathBuf::from(path));
        }
        if vad.model_url.is_some() {
            target.model_url = vad.model_url;
        }
    }

    if let Some(nc) = yaml.noise_cancellation {
        let target = &mut config.suppression;
        if let Some(enabled) = nc.enabled {
            target.enabled = enabled;
        }
        if let Some(stationary) = nc.stationary {
            target.stationary = stationary;
        }
        if let Some(prop_decrease) = nc.prop_decrease {
            target.prop_decrease = prop_decrease;
        }
        if let Some(frames) = nc.learning_frames {
            target.learning_frames = frames;
        }
    }

    if let Some(interruption) = yaml.interruption {
        let target = &mut config.interruption;
        if let Some(enabled) = interruption.enabled {
            target.enabled = enabled;
        }
        if let Some(cooldown) = interruption.cooldown_ms {
            target.cooldown_ms = cooldown;
        }
        if let Some(signal) = interruption.signal_agent {
            target.signal_agent = signal;
        }
    }

    if let Some(timeouts) = yaml.timeouts {
        let target = &mut config.timeouts;
        let ms = Duration::from_millis;
        if let Some(value) = timeouts.room_connect_ms {
            target.room_connect = ms(value);
        }
        if let Some(value) = timeouts.dispatch_wait_ms {
            target.dispatch_wait = ms(value);
        }
        if let Some(value) = timeouts.cleanup_ms {
            target.cleanup = ms(value);
        }
        if let Some(value) = timeouts.task_join_ms {
            target.task_join = ms(value);
        }
        if let Some(value) = timeouts.websocket_close_ms {
            target.websocket_close = ms(value);
        }
        if let Some(value) = timeouts.backend_ms {
            target.backend = ms(value);
        }
    }

    if let Some(path) = yaml.cache.and_then(|cache| cache.path) {
        let path = PathBuf::from(path);
        config.vad.cache_path = Some(path.clone());
        config.cache_path = Some(path);
    }

    Ok(())
}
