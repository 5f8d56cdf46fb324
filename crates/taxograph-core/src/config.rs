//! Environment variable helpers used by every `from_env` constructor.
//!
//! Missing variables fall back to the given default; present but
//! unparseable values are configuration errors rather than silent defaults.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Read and parse `key`, falling back to `default` when unset or empty.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_or(key, std::env::var(key).ok(), default)
}

/// Read `key` as a string, falling back to `default` when unset or empty.
pub fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Split a comma-separated parameter, dropping empty segments.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse an optional raw value; separated from `env_or` so it is testable
/// without touching the process environment.
pub fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|e| Error::Config(format!("{} has invalid value {:?}: {}", key, value, e))),
    }
}
