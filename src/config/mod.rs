//! Configuration for skylift.
//!
//! Settings are loaded with priority: env var > default. A `.env` file is
//! loaded via dotenvy early in startup, so deployments can keep everything
//! in one place.

pub(crate) mod helpers;

use std::path::PathBuf;

use crate::config::helpers::{optional_env, parse_env, parse_string_env};
use crate::error::ConfigError;

/// The authorization scope requested from the identity provider. Fixed:
/// the console only ever asks for compute access on the user's behalf.
pub const DEFAULT_OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/compute";

/// Main configuration for the console.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub vault: VaultConfig,
    pub oauth: OAuthConfig,
    pub provisioner: ProvisionerConfig,
}

/// Where the HTTP front-end listens.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Durable storage for per-client credential artifacts.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub data_dir: PathBuf,
}

/// The authorization-code flow endpoints on our side.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Where the identity provider sends the browser back to. Must match
    /// the redirect URI registered with the provider.
    pub callback_url: String,
    /// Scope requested when building the authorization URL.
    pub scope: String,
    /// Timeout for the code-for-tokens exchange.
    pub exchange_timeout_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            callback_url: "http://localhost:8080/oauth2/callback".to_string(),
            scope: DEFAULT_OAUTH_SCOPE.to_string(),
            exchange_timeout_secs: 30,
        }
    }
}

/// The external tools command that performs the real infrastructure work.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Executable invoked for bring-up and tear-down runs.
    pub command: String,
    /// Scratch directory for per-run artifacts (hosts layouts, etc).
    pub scratch_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let data_dir = match optional_env("SKYLIFT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        Ok(Self {
            http: HttpConfig {
                host: parse_string_env("SKYLIFT_HOST", "127.0.0.1"),
                port: parse_env("SKYLIFT_PORT", 8080)?,
            },
            oauth: OAuthConfig {
                callback_url: parse_string_env(
                    "SKYLIFT_CALLBACK_URL",
                    "http://localhost:8080/oauth2/callback",
                ),
                scope: parse_string_env("SKYLIFT_OAUTH_SCOPE", DEFAULT_OAUTH_SCOPE),
                exchange_timeout_secs: parse_env("SKYLIFT_EXCHANGE_TIMEOUT_SECS", 30)?,
            },
            provisioner: ProvisionerConfig {
                command: parse_string_env("SKYLIFT_TOOLS_COMMAND", "skylift-tools"),
                scratch_dir: data_dir.join("runs"),
            },
            vault: VaultConfig { data_dir },
        })
    }
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".skylift").join("data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let http = HttpConfig::default();
        assert_eq!(http.port, 8080);

        let oauth = OAuthConfig::default();
        assert!(oauth.callback_url.ends_with("/oauth2/callback"));
        assert_eq!(oauth.scope, DEFAULT_OAUTH_SCOPE);
    }
}
