//! Small helpers for reading configuration out of the environment.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read an env var, treating "unset" and "empty" the same way.
pub(crate) fn optional_env(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Read a string env var with a default.
pub(crate) fn parse_string_env(var: &str, default: &str) -> String {
    optional_env(var).unwrap_or_else(|| default.to_string())
}

/// Read and parse an env var with a default, erroring on unparseable values
/// rather than silently falling back.
pub(crate) fn parse_env<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
