//! Helpers for reading typed values out of the environment

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Environment variable, trimmed; unset or blank is `None`
pub(crate) fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// First variable of `names` that is set
pub(crate) fn env_var_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env_var(name))
}

/// Parse a variable, falling back to `default` when unset
pub(crate) fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env_var(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`)
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env_var(name) {
        Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
            reason: "expected a boolean".to_string(),
        }),
        None => Ok(default),
    }
}
