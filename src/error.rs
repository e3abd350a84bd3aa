//! Process-level error types.
//!
//! Subsystem errors live next to their modules (`vault::VaultError`,
//! `handoff::HandoffError`, `jobs::RegistryError`, `cluster::ClusterError`).
//! This module holds the errors shared across them.

/// Errors raised while loading configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },

    #[error("could not determine the home directory")]
    NoHomeDir,
}
