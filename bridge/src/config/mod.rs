//! Configuration module for the telephony bridge
//!
//! This module handles configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use telephony_bridge::config::BridgeConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = BridgeConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = BridgeConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Bridge listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::{InterruptionConfig, NoiseConfig, SuppressionConfig, VADConfig};
use crate::errors::ConfigError;

pub const DEFAULT_AGENT_NAME: &str = "Mysyara Agent";
pub const DEFAULT_PARTICIPANT_NAME: &str = "Telephony Caller";
pub const DEFAULT_REJECT_MESSAGE: &str = "Calls are not being accepted at this time";

/// LiveKit server and credentials
#[derive(Clone)]
pub struct LiveKitConfig {
    /// Server URL (`ws://` / `wss://`)
    pub url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Display name of the caller's participant
    pub participant_name: String,
}

impl LiveKitConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("participant_name", &self.participant_name)
            .finish()
    }
}

/// Zeroize the LiveKit credentials when the configuration is dropped.
impl Drop for LiveKitConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.api_secret {
            secret.zeroize();
        }
    }
}

/// Bounds on the session's blocking steps
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    pub room_connect: Duration,
    /// How long `run` waits for the agent dispatch before moving on
    pub dispatch_wait: Duration,
    /// Room disconnect and background-loop join during cleanup
    pub cleanup: Duration,
    /// Join of a cancelled agent-audio task before it is aborted
    pub task_join: Duration,
    pub websocket_close: Duration,
    pub backend: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            room_connect: Duration::from_secs(8),
            dispatch_wait: Duration::from_secs(2),
            cleanup: Duration::from_secs(3),
            task_join: Duration::from_millis(500),
            websocket_close: Duration::from_secs(2),
            backend: Duration::from_secs(10),
        }
    }
}

/// Bridge configuration
///
/// Built once at startup and shared with every session through an `Arc`.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    pub livekit: LiveKitConfig,

    // Agent naming
    pub default_agent_name: String,
    /// `AGENT_NAME`, preferred over the default
    pub env_agent_name: Option<String>,

    // Call acceptance
    pub accept_incoming_calls: bool,
    pub reject_message: String,

    /// Base URL of the call-record API; calls are not recorded when unset
    pub backend_api_url: Option<String>,

    // Audio processing
    pub noise: NoiseConfig,
    pub vad: VADConfig,
    pub suppression: SuppressionConfig,
    pub interruption: InterruptionConfig,

    pub timeouts: TimeoutConfig,

    pub cache_path: Option<PathBuf>,
}

impl BridgeConfig {
    /// Load configuration from environment variables only
    ///
    /// The `.env` file, if any, is loaded by `main` before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Agent to serve a call: `custom` (from the request) > `AGENT_NAME` > default.
    pub fn resolve_agent_name(&self, custom: Option<&str>) -> String {
        custom
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or(self.env_agent_name.as_deref())
            .unwrap_or(&self.default_agent_name)
            .to_string()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            livekit: LiveKitConfig {
                url: "ws://localhost:7880".to_string(),
                api_key: None,
                api_secret: None,
                participant_name: DEFAULT_PARTICIPANT_NAME.to_string(),
            },
            default_agent_name: DEFAULT_AGENT_NAME.to_string(),
            env_agent_name: None,
            accept_incoming_calls: true,
            reject_message: DEFAULT_REJECT_MESSAGE.to_string(),
            backend_api_url: None,
            noise: NoiseConfig::default(),
            vad: VADConfig::default(),
            suppression: SuppressionConfig::default(),
            interruption: InterruptionConfig::default(),
            timeouts: TimeoutConfig::default(),
            cache_path: None,
        }
    }
}
