//! The credential handoff: stash before redirect, resume after callback.
//!
//! Deployments that need delegated cloud access cannot start until the
//! user authorizes us at an external identity provider. Rather than hold
//! server-side session state across that redirect, the in-progress
//! submission is encrypted into a cookie (the "stash") and recovered on
//! the provider's callback (the "resume"), at which point the deployment
//! starts as if the submission had arrived directly.
//!
//! At most one stash per client id is outstanding at a time: every stash
//! rotates the symmetric key, so a cookie that lost the race fails its
//! resume with a clean decrypt error instead of producing garbage.

mod exchange;

pub use exchange::{HttpTokenExchanger, TokenExchanger, TokenMaterial};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::config::OAuthConfig;
use crate::identity;
use crate::jobs::PlacementKind;
use crate::vault::{CredentialVault, VaultError};

/// Errors surfaced by the stash and resume phases.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("provider secrets document is malformed: {0}")]
    MalformedSecrets(String),

    #[error("callback is missing the {0} cookie")]
    MissingCookie(&'static str),

    #[error("could not recover the stashed submission: {0}")]
    DecryptFailure(String),

    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("advanced placement does not survive the authorization redirect; resubmit with explicit hosts after authorizing")]
    UnsupportedPlacement,

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// A provider client-secrets document. Only the `web` object matters.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSecrets {
    pub web: WebSecrets,
}

/// The fields of the `web` object the handoff actually uses.
#[derive(Clone, Deserialize)]
pub struct WebSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

impl ProviderSecrets {
    /// Parse a secrets document as submitted on the form.
    pub fn parse(document: &str) -> Result<Self, HandoffError> {
        let secrets: ProviderSecrets = serde_json::from_str(document)
            .map_err(|e| HandoffError::MalformedSecrets(e.to_string()))?;
        if secrets.web.client_id.trim().is_empty() {
            return Err(HandoffError::MalformedSecrets(
                "client_id is empty".to_string(),
            ));
        }
        Ok(secrets)
    }
}

impl fmt::Debug for WebSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// The submission fields stashed across the redirect - exactly what the
/// deployment needs to resume on callback.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StashedSubmission {
    pub email: String,
    pub password: String,
    pub max_nodes: u32,
    pub deployment_type: PlacementKind,
    pub instance_type: String,
    pub machine_image: String,
    pub project: String,
    pub client_secrets: String,
}

impl fmt::Debug for StashedSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StashedSubmission")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("max_nodes", &self.max_nodes)
            .field("deployment_type", &self.deployment_type)
            .field("instance_type", &self.instance_type)
            .field("machine_image", &self.machine_image)
            .field("project", &self.project)
            .field("client_secrets", &"[REDACTED]")
            .finish()
    }
}

/// What the stash phase hands back to the web layer: a redirect target
/// and the two cookie values that must survive the round trip.
#[derive(Debug, Clone)]
pub struct StashOutcome {
    pub authorize_url: String,
    /// Base64 of the encrypted submission.
    pub payload_cookie: String,
    /// The plaintext client id, needed to find the key again on callback.
    pub client_id: String,
}

/// A successfully resumed submission plus the freshly stored credentials.
#[derive(Debug)]
pub struct ResumedDeployment {
    pub submission: StashedSubmission,
    pub credentials_path: PathBuf,
}

/// Orchestrates the two-phase handoff over the vault and the exchanger.
pub struct CredentialHandoff {
    vault: Arc<CredentialVault>,
    exchanger: Arc<dyn TokenExchanger>,
    config: OAuthConfig,
}

impl CredentialHandoff {
    pub fn new(
        vault: Arc<CredentialVault>,
        exchanger: Arc<dyn TokenExchanger>,
        config: OAuthConfig,
    ) -> Self {
        Self {
            vault,
            exchanger,
            config,
        }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Phase one: persist the secrets, encrypt the submission, and hand
    /// back the redirect target plus the two cookies.
    pub fn stash(&self, submission: &StashedSubmission) -> Result<StashOutcome, HandoffError> {
        if submission.deployment_type == PlacementKind::Advanced {
            return Err(HandoffError::UnsupportedPlacement);
        }

        let secrets = ProviderSecrets::parse(&submission.client_secrets)?;
        let client_id = secrets.web.client_id.clone();
        let key = identity::client_key(&client_id);

        // Any previously issued grant may have expired; clear it so the
        // resume always exchanges a fresh code.
        self.vault.delete_credentials(&key)?;
        self.vault.store_secrets(&key, &submission.client_secrets)?;

        let authorize_url =
            build_authorize_url(&secrets.web, &self.config.callback_url, &self.config.scope);

        let plaintext = serde_json::to_vec(submission)
            .map_err(|e| HandoffError::Vault(VaultError::EncryptFailure(e.to_string())))?;
        let ciphertext = self.vault.encrypt(&key, &plaintext)?;

        tracing::info!(client_key = %key, "Stashed submission for authorization redirect");

        Ok(StashOutcome {
            authorize_url,
            payload_cookie: URL_SAFE_NO_PAD.encode(ciphertext),
            client_id,
        })
    }

    /// Phase two: recover the submission from the cookies, exchange the
    /// authorization code, and persist the resulting tokens.
    pub async fn resume(
        &self,
        client_id: Option<&str>,
        payload_cookie: Option<&str>,
        code: &str,
    ) -> Result<ResumedDeployment, HandoffError> {
        let client_id = client_id.ok_or(HandoffError::MissingCookie("client_id"))?;
        let payload_cookie = payload_cookie.ok_or(HandoffError::MissingCookie("data"))?;
        let key = identity::client_key(client_id);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(payload_cookie)
            .map_err(|_| HandoffError::DecryptFailure("cookie is not valid base64".to_string()))?;

        let plaintext = self.vault.decrypt(&key, &ciphertext).map_err(|e| match e {
            VaultError::DecryptFailure(reason) => HandoffError::DecryptFailure(reason),
            other => HandoffError::Vault(other),
        })?;

        let submission: StashedSubmission = serde_json::from_str(plaintext.expose())
            .map_err(|e| HandoffError::DecryptFailure(format!("payload did not parse: {}", e)))?;

        if submission.deployment_type == PlacementKind::Advanced {
            return Err(HandoffError::UnsupportedPlacement);
        }

        // The secrets persisted at stash time drive the exchange, exactly
        // like they drove the authorization URL.
        let document = self.vault.load_secrets(&key)?;
        let secrets = ProviderSecrets::parse(&document)?;

        let tokens = self
            .exchanger
            .exchange(&secrets.web, code, &self.config.callback_url)
            .await?;

        let token_document = serde_json::to_string(&tokens)
            .map_err(|e| HandoffError::ExchangeFailed(e.to_string()))?;
        let credentials_path = self.vault.store_access_credentials(&key, &token_document)?;

        tracing::info!(client_key = %key, "Resumed stashed submission after callback");

        Ok(ResumedDeployment {
            submission,
            credentials_path,
        })
    }
}

/// Assemble the provider's authorization URL for the consent redirect.
/// `access_type=offline` asks for a refresh token alongside the access
/// token, so the credentials outlive the first hour.
fn build_authorize_url(secrets: &WebSecrets, redirect_uri: &str, scope: &str) -> String {
    let params = [
        ("response_type", "code"),
        ("client_id", secrets.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", scope),
        ("access_type", "offline"),
    ];
    let encoded = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, pct_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if secrets.auth_uri.contains('?') { "&" } else { "?" };
    format!("{}{}{}", secrets.auth_uri, separator, encoded)
}

fn pct_encode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.as_bytes() {
        let ch = *byte as char;
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~') {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
