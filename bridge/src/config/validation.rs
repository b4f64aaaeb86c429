//! Configuration validation

use url::Url;

use super::BridgeConfig;
use crate::errors::ConfigError;

/// Validate every section of a merged configuration
pub(crate) fn validate_config(config: &BridgeConfig) -> Result<(), ConfigError> {
    config.noise.validate().map_err(ConfigError::Invalid)?;
    config.suppression.validate().map_err(ConfigError::Invalid)?;
    config
        .vad
        .validate()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    validate_livekit_url(&config.livekit.url)?;
    if let Some(url) = &config.backend_api_url {
        validate_backend_url(url)?;
    }
    Ok(())
}

fn validate_livekit_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::Invalid(format!("Invalid LIVEKIT_URL '{url}': {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "LIVEKIT_URL must use ws, wss, http or https, got '{other}'"
        ))),
    }
}

/// The backend base URL must be absolute http(s) with a host
pub(crate) fn validate_backend_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|e| {
        ConfigError::Invalid(format!("Invalid INCOMING_CALL_AGENT_BACKEND_API '{url}': {e}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "INCOMING_CALL_AGENT_BACKEND_API must be http(s), got '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ConfigError::Invalid(
            "INCOMING_CALL_AGENT_BACKEND_API must have a host".to_string(),
        ));
    }
    Ok(())
}
