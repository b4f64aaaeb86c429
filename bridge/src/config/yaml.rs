use serde::Deserialize;
use std::path::Path;

use crate::errors::ConfigError;

/// Complete YAML configuration structure
///
/// Every field is optional; anything present overrides the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8765
///
/// livekit:
///   url: "wss://livekit.example.com"
///   api_key: "your-api-key"
///   api_secret: "your-api-secret"
///   participant_name: "Telephony Caller"
///
/// agent:
///   name: "Support Agent"
///   default_name: "Mysyara Agent"
///
/// calls:
///   accept_incoming: true
///   reject_message: "We are not taking calls right now"
///   backend_api_url: "http://backend.internal:8000"
///
/// noise:
///   enabled: true
///   type: "call-center"
///   volume: 0.15
///   folder: "noise"
///
/// vad:
///   enabled: true
///   backend: "energy"
///   threshold: 0.5
///   speech_frames: 3
///   silence_frames: 10
///
/// noise_cancellation:
///   enabled: true
///   stationary: true
///   prop_decrease: 0.8
///   learning_frames: 25
///
/// interruption:
///   enabled: true
///   cooldown_ms: 500
///   signal_agent: true
///
/// timeouts:
///   room_connect_ms: 8000
///   dispatch_wait_ms: 2000
///
/// cache:
///   path: "/var/cache/telephony-bridge"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub livekit: Option<LiveKitYaml>,
    pub agent: Option<AgentYaml>,
    pub calls: Option<CallsYaml>,
    pub noise: Option<NoiseYaml>,
    pub vad: Option<VadYaml>,
    pub noise_cancellation: Option<NoiseCancellationYaml>,
    pub interruption: Option<InterruptionYaml>,
    pub timeouts: Option<TimeoutsYaml>,
    pub cache: Option<CacheYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// LiveKit configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveKitYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub participant_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentYaml {
    /// Overrides `AGENT_NAME`
    pub name: Option<String>,
    pub default_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallsYaml {
    pub accept_incoming: Option<bool>,
    pub reject_message: Option<String>,
    pub backend_api_url: Option<String>,
}

/// Background noise mixing
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NoiseYaml {
    pub enabled: Option<bool>,
    #[serde(rename = "type")]
    pub noise_type: Option<String>,
    pub volume: Option<f32>,
    pub folder: Option<String>,
    pub decoder_path: Option<String>,
    pub decode_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadYaml {
    pub enabled: Option<bool>,
    pub backend: Option<String>,
    pub threshold: Option<f32>,
    pub speech_frames: Option<u32>,
    pub silence_frames: Option<u32>,
    pub model_path: Option<String>,
    pub model_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NoiseCancellationYaml {
    pub enabled: Option<bool>,
    pub stationary: Option<bool>,
    pub prop_decrease: Option<f32>,
    pub learning_frames: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InterruptionYaml {
    pub enabled: Option<bool>,
    pub cooldown_ms: Option<u64>,
    pub signal_agent: Option<bool>,
}

/// Timeouts in milliseconds
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub room_connect_ms: Option<u64>,
    pub dispatch_wait_ms: Option<u64>,
    pub cleanup_ms: Option<u64>,
    pub task_join_ms: Option<u64>,
    pub websocket_close_ms: Option<u64>,
    pub backend_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub path: Option<String>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&contents)?)
    }
}
