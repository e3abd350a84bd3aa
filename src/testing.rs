//! Test doubles for the external collaborators.
//!
//! Used by the unit tests here and by the integration tests under
//! `tests/`; nothing in here runs in production paths.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cluster::{ClusterControl, ClusterError};
use crate::handoff::{HandoffError, TokenExchanger, TokenMaterial, WebSecrets};
use crate::jobs::DeployParams;

/// In-memory cluster tools: records invocations, optionally sleeps,
/// optionally fails.
pub struct StubClusterControl {
    delay: Option<Duration>,
    fail_with: Option<String>,
    pub bring_ups: Arc<Mutex<Vec<String>>>,
    pub tear_downs: Arc<Mutex<Vec<String>>>,
}

impl StubClusterControl {
    pub fn new() -> Self {
        Self {
            delay: None,
            fail_with: None,
            bring_ups: Arc::new(Mutex::new(Vec::new())),
            tear_downs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every operation fails with `reason`, as if the tools reported it.
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::new()
        }
    }

    /// Sleep before completing, to hold jobs in a non-terminal state.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn outcome(&self) -> Result<String, ClusterError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(reason) => Err(ClusterError::ExecutionFailed {
                reason: reason.clone(),
            }),
            None => Ok("completed".to_string()),
        }
    }
}

impl Default for StubClusterControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterControl for StubClusterControl {
    async fn bring_up(
        &self,
        identifier: &str,
        _params: &DeployParams,
    ) -> Result<String, ClusterError> {
        self.bring_ups.lock().await.push(identifier.to_string());
        self.outcome().await
    }

    async fn tear_down(
        &self,
        identifier: &str,
        _params: &DeployParams,
    ) -> Result<String, ClusterError> {
        self.tear_downs.lock().await.push(identifier.to_string());
        self.outcome().await
    }
}

/// Token exchanger that records the codes it sees and returns canned
/// token material without any network traffic.
pub struct StubTokenExchanger {
    pub codes: Arc<Mutex<Vec<String>>>,
}

impl StubTokenExchanger {
    pub fn new() -> Self {
        Self {
            codes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for StubTokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenExchanger for StubTokenExchanger {
    async fn exchange(
        &self,
        _secrets: &WebSecrets,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenMaterial, HandoffError> {
        self.codes.lock().await.push(code.to_string());
        Ok(TokenMaterial {
            access_token: "stub-access-token".to_string(),
            refresh_token: Some("stub-refresh-token".to_string()),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
        })
    }
}

/// A minimal well-formed provider secrets document for `client_id`.
pub fn test_secrets_document(client_id: &str) -> String {
    serde_json::json!({
        "web": {
            "client_id": client_id,
            "client_secret": "test-client-secret",
            "auth_uri": "https://accounts.example.com/o/oauth2/auth",
            "token_uri": "https://accounts.example.com/o/oauth2/token",
        }
    })
    .to_string()
}
