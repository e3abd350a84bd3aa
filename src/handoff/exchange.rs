//! Authorization-code exchange against the provider's token endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::handoff::{HandoffError, WebSecrets};

/// Access/refresh tokens returned by a completed exchange. Persisted
/// verbatim for the cluster tools to pick up.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenMaterial {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMaterial")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Exchanges an authorization code for tokens. Injectable so tests never
/// talk to a real provider.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(
        &self,
        secrets: &WebSecrets,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenMaterial, HandoffError>;
}

/// Production exchanger: a form POST to the document's token endpoint.
pub struct HttpTokenExchanger {
    client: Client,
}

impl HttpTokenExchanger {
    pub fn new(timeout: Duration) -> Result<Self, HandoffError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            HandoffError::ExchangeFailed(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(
        &self,
        secrets: &WebSecrets,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenMaterial, HandoffError> {
        let response = self
            .client
            .post(&secrets.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| HandoffError::ExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandoffError::ExchangeFailed(format!(
                "token endpoint returned {}: {}",
                status,
                body.trim()
            )));
        }

        response
            .json::<TokenMaterial>()
            .await
            .map_err(|e| HandoffError::ExchangeFailed(format!("unreadable token response: {}", e)))
    }
}
