//! Bridge error types
//!
//! Each boundary has its own error enum ([`AudioError`], [`RoomError`],
//! [`TelephonyError`]); [`BridgeError`] collects them for the session and the
//! server, and [`ConfigError`] covers configuration loading.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::audio::AudioError;
use crate::room::RoomError;
use crate::telephony::TelephonyError;

/// Result type for session-level operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by a call session or the server around it
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Room error: {0}")]
    Room(#[from] RoomError),

    #[error("Telephony error: {0}")]
    Telephony(#[from] TelephonyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backend call-record API failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Backend(err.to_string())
    }
}

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Environment variable present but unparsable
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },

    /// Value parsed but outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
