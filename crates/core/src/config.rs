//! Helpers for reading typed configuration from environment variables.
//!
//! Binaries call `dotenvy::dotenv()` first and then build their config
//! structs from these helpers, failing fast on malformed values.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Parse `raw` (the value of `key`, if set) into `T`, falling back to
/// `default` when unset or blank.
pub fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) if !value.trim().is_empty() => value.trim().parse().map_err(|e| {
            CoreError::Validation(format!("{key} has invalid value '{value}': {e}"))
        }),
        _ => Ok(default),
    }
}

/// Read `key` from the process environment and parse it into `T`.
pub fn env_or<T>(key: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_or(key, std::env::var(key).ok(), default)
}

/// Read a string variable with a default.
pub fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read a directory path with a default.
pub fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(key, default))
}

/// Read a whole-second duration, rejecting zero.
pub fn env_secs(key: &str, default: Duration) -> Result<Duration, CoreError> {
    let secs: u64 = env_or(key, default.as_secs())?;
    positive(key, Duration::from_secs(secs))
}

/// Read a millisecond duration, rejecting zero.
pub fn env_millis(key: &str, default: Duration) -> Result<Duration, CoreError> {
    let millis: u64 = env_or(key, default.as_millis() as u64)?;
    positive(key, Duration::from_millis(millis))
}

/// Split a comma-separated value into trimmed, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Log line format, read from `LOG_FORMAT` by both binaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    pub fn from_env() -> Result<Self, CoreError> {
        env_or("LOG_FORMAT", Self::default())
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err("expected 'text' or 'json'".to_string()),
        }
    }
}

fn positive(key: &str, value: Duration) -> Result<Duration, CoreError> {
    if value.is_zero() {
        Err(CoreError::Validation(format!("{key} must be greater than zero")))
    } else {
        Ok(value)
    }
}
