//! HTTP boundary for the console.
//!
//! Handlers translate requests into registry and handoff operations and
//! nothing else; validation of what a submission means lives behind those
//! seams. Every failure comes back as a structured
//! `{"status": "error", "error_message": ...}` body, never a raw fault.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::handoff::{CredentialHandoff, HandoffError, StashOutcome, StashedSubmission};
use crate::jobs::registry::RegistryError;
use crate::jobs::{
    AdminCredentials, CloudAccess, CloudSpec, DeployParams, DeployTarget, Infrastructure,
    JobRegistry, JobSummary, Placement, PlacementKind, StatusReport,
};
use crate::vault::VaultError;

/// Cookie carrying the encrypted submission across the redirect.
const PAYLOAD_COOKIE: &str = "data";

/// Cookie carrying the plaintext client id, needed to locate the key.
const CLIENT_ID_COOKIE: &str = "client_id";

/// Shared state for the console's request handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub handoff: Arc<CredentialHandoff>,
}

/// Build the console router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/deployments", post(start_deployment).get(list_deployments))
        .route("/deployments/{keyname}/status", get(deployment_status))
        .route("/deployments/{keyname}/terminate", post(start_termination))
        .route("/terminations", get(list_terminations))
        .route("/terminations/{keyname}/status", get(termination_status))
        .route("/oauth2/callback", get(oauth2_callback))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Start the HTTP server on the given address.
pub async fn start(
    state: AppState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = router(state);
    let addr = format!("{}:{}", host, port);

    tracing::info!("Console listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

// -- Error shape --

/// A structured error response. Everything a handler can fail with folds
/// into this before it reaches the wire.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "status": "error",
            "error_message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: e.to_string(),
        }
    }
}

impl From<HandoffError> for ApiError {
    fn from(e: HandoffError) -> Self {
        let status = match &e {
            HandoffError::MalformedSecrets(_)
            | HandoffError::MissingCookie(_)
            | HandoffError::DecryptFailure(_) => StatusCode::BAD_REQUEST,
            HandoffError::UnsupportedPlacement => StatusCode::UNPROCESSABLE_ENTITY,
            HandoffError::ExchangeFailed(_) => StatusCode::BAD_GATEWAY,
            HandoffError::Vault(vault) => match vault {
                VaultError::KeyNotFound(_)
                | VaultError::SecretsNotFound(_)
                | VaultError::InvalidUtf8 => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

// -- Requests --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DeploymentChoice {
    Cluster,
    Cloud,
}

/// The deployment form, as submitted. Which optional fields must be
/// present depends on the chosen deployment and infrastructure.
#[derive(Deserialize)]
struct StartDeploymentRequest {
    email: String,
    password: String,
    deployment: DeploymentChoice,
    #[serde(default)]
    ips_yaml: Option<String>,
    #[serde(default)]
    root_password: Option<String>,
    #[serde(default)]
    infrastructure: Option<Infrastructure>,
    #[serde(default)]
    deployment_type: Option<PlacementKind>,
    #[serde(default)]
    max_nodes: Option<u32>,
    #[serde(default)]
    instance_type: Option<String>,
    #[serde(default)]
    machine_image: Option<String>,
    #[serde(default)]
    access_key: Option<String>,
    #[serde(default)]
    secret_key: Option<String>,
    #[serde(default)]
    endpoint_url: Option<String>,
    #[serde(default)]
    client_secrets: Option<String>,
    #[serde(default)]
    project: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
}

// -- Handlers --

async fn health_check() -> &'static str {
    "ok"
}

async fn start_deployment(
    State(state): State<AppState>,
    Json(req): Json<StartDeploymentRequest>,
) -> Result<Response, ApiError> {
    match req.deployment {
        DeploymentChoice::Cluster => {
            let ips_yaml = required(req.ips_yaml, "ips_yaml")?;
            let root_password = required(req.root_password, "root_password")?;
            let params = DeployParams {
                credentials: AdminCredentials {
                    email: req.email,
                    password: req.password,
                },
                target: DeployTarget::Cluster {
                    ips_yaml,
                    root_password,
                },
            };
            let keyname = state.registry.start_deployment(params).await;
            Ok(started_response(&keyname))
        }
        DeploymentChoice::Cloud => start_cloud_deployment(state, req).await,
    }
}

async fn start_cloud_deployment(
    state: AppState,
    req: StartDeploymentRequest,
) -> Result<Response, ApiError> {
    let infrastructure = req
        .infrastructure
        .ok_or_else(|| ApiError::bad_request("cloud deployments need an infrastructure"))?;
    let deployment_type = req
        .deployment_type
        .ok_or_else(|| ApiError::bad_request("cloud deployments need a deployment_type"))?;
    let instance_type = required(req.instance_type, "instance_type")?;
    let machine_image = required(req.machine_image, "machine_image")?;

    // Delegated access: the submission cannot start until the user has
    // authorized us, so it gets stashed and the browser redirected.
    if infrastructure == Infrastructure::Gce {
        let client_secrets = required(req.client_secrets, "client_secrets")?;
        let max_nodes = req
            .max_nodes
            .ok_or_else(|| ApiError::bad_request("simple placements need max_nodes"))?;
        let submission = StashedSubmission {
            email: req.email,
            password: req.password,
            max_nodes,
            deployment_type,
            instance_type,
            machine_image,
            project: req.project.unwrap_or_default(),
            client_secrets,
        };
        let outcome = state.handoff.stash(&submission)?;
        return redirect_with_cookies(&outcome);
    }

    let access_key = required(req.access_key, "access_key")?;
    let secret_key = required(req.secret_key, "secret_key")?;
    let placement = match deployment_type {
        PlacementKind::Simple => Placement::Simple {
            max_nodes: req
                .max_nodes
                .ok_or_else(|| ApiError::bad_request("simple placements need max_nodes"))?,
        },
        PlacementKind::Advanced => Placement::Advanced {
            ips_yaml: required(req.ips_yaml, "ips_yaml")?,
        },
    };

    let params = DeployParams {
        credentials: AdminCredentials {
            email: req.email,
            password: req.password,
        },
        target: DeployTarget::Cloud(CloudSpec {
            infrastructure,
            machine_image,
            instance_type,
            project: req.project.filter(|p| !p.trim().is_empty()),
            placement,
            access: CloudAccess::Keys {
                access_key,
                secret_key,
                endpoint_url: req.endpoint_url.filter(|u| !u.trim().is_empty()),
            },
        }),
    };
    let keyname = state.registry.start_deployment(params).await;
    Ok(started_response(&keyname))
}

async fn deployment_status(
    State(state): State<AppState>,
    Path(keyname): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.registry.deployment_status(&keyname).await?))
}

async fn termination_status(
    State(state): State<AppState>,
    Path(keyname): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.registry.termination_status(&keyname).await?))
}

async fn start_termination(
    State(state): State<AppState>,
    Path(keyname): Path<String>,
) -> Result<Response, ApiError> {
    state.registry.start_termination(&keyname).await?;
    Ok(started_response(&keyname))
}

async fn list_deployments(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    Json(state.registry.list_deployments().await)
}

async fn list_terminations(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    Json(state.registry.list_terminations().await)
}

/// The provider's callback: recover the stash, exchange the code, and
/// start the deployment as if the submission had arrived directly.
async fn oauth2_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let code = query
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("callback did not include an authorization code"))?;

    let client_id = cookie_value(&headers, CLIENT_ID_COOKIE);
    let payload = cookie_value(&headers, PAYLOAD_COOKIE);

    let resumed = state
        .handoff
        .resume(client_id.as_deref(), payload.as_deref(), &code)
        .await?;

    let submission = resumed.submission;
    let placement = match submission.deployment_type {
        PlacementKind::Simple => Placement::Simple {
            max_nodes: submission.max_nodes,
        },
        // resume() already rejects these; kept as a typed failure in case
        // the policy there ever loosens.
        PlacementKind::Advanced => return Err(HandoffError::UnsupportedPlacement.into()),
    };

    let params = DeployParams {
        credentials: AdminCredentials {
            email: submission.email,
            password: submission.password,
        },
        target: DeployTarget::Cloud(CloudSpec {
            infrastructure: Infrastructure::Gce,
            machine_image: submission.machine_image,
            instance_type: submission.instance_type,
            project: Some(submission.project).filter(|p| !p.trim().is_empty()),
            placement,
            access: CloudAccess::DelegatedCredentials {
                path: resumed.credentials_path,
            },
        }),
    };

    let keyname = state.registry.start_deployment(params).await;
    Ok(started_response(&keyname))
}

// -- Helpers --

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
    field
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("missing required field {}", name)))
}

fn started_response(keyname: &str) -> Response {
    Json(serde_json::json!({
        "status": "started",
        "keyname": keyname,
    }))
    .into_response()
}

fn redirect_with_cookies(outcome: &StashOutcome) -> Result<Response, ApiError> {
    let mut response = Redirect::to(&outcome.authorize_url).into_response();
    let headers = response.headers_mut();
    headers.append(
        SET_COOKIE,
        cookie_header(PAYLOAD_COOKIE, &outcome.payload_cookie)?,
    );
    headers.append(
        SET_COOKIE,
        cookie_header(CLIENT_ID_COOKIE, &outcome.client_id)?,
    );
    Ok(response)
}

fn cookie_header(name: &str, value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!("{}={}; Path=/; HttpOnly", name, value))
        .map_err(|_| ApiError::internal("cookie value is not header-safe"))
}

/// Pull one cookie's value out of the request headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((k, v)) = pair.trim().split_once('=') {
                if k == name {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}
