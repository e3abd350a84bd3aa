//! Deployment and termination jobs.
//!
//! A job is one asynchronous run of the cluster tools: bring a deployment
//! up, or tear one down. Jobs are keyed by a caller-visible keyname and
//! live in the in-memory [`registry::JobRegistry`] for the lifetime of the
//! process.

pub mod registry;

pub use registry::JobRegistry;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Which direction a job runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deploy,
    Terminate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal and in-flight states of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Current state of a job plus a human-readable detail message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: JobState,
    pub message: String,
}

impl StatusReport {
    fn pending() -> Self {
        Self {
            status: JobState::Pending,
            message: "waiting for a worker".to_string(),
        }
    }
}

/// One-line job description for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub keyname: String,
    pub operation: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: StatusReport,
}

/// Admin account that owns the deployment.
#[derive(Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Simple placements size the deployment by node count; advanced ones name
/// every host explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementKind {
    Simple,
    Advanced,
}

/// Topology selection for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Simple { max_nodes: u32 },
    Advanced { ips_yaml: String },
}

impl Placement {
    pub fn kind(&self) -> PlacementKind {
        match self {
            Self::Simple { .. } => PlacementKind::Simple,
            Self::Advanced { .. } => PlacementKind::Advanced,
        }
    }
}

/// Supported IaaS backends for cloud deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Infrastructure {
    Ec2,
    Euca,
    Gce,
}

impl Infrastructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ec2 => "ec2",
            Self::Euca => "euca",
            Self::Gce => "gce",
        }
    }
}

/// How the cluster tools authenticate against the IaaS.
#[derive(Clone)]
pub enum CloudAccess {
    /// Static access/secret key pair, optionally against a custom endpoint.
    Keys {
        access_key: String,
        secret_key: String,
        endpoint_url: Option<String>,
    },
    /// Credentials file produced by a completed authorization exchange.
    DelegatedCredentials { path: PathBuf },
}

impl fmt::Debug for CloudAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keys { endpoint_url, .. } => f
                .debug_struct("Keys")
                .field("access_key", &"[REDACTED]")
                .field("secret_key", &"[REDACTED]")
                .field("endpoint_url", endpoint_url)
                .finish(),
            Self::DelegatedCredentials { path } => f
                .debug_struct("DelegatedCredentials")
                .field("path", path)
                .finish(),
        }
    }
}

/// Everything a cloud bring-up needs beyond the admin account.
#[derive(Debug, Clone)]
pub struct CloudSpec {
    pub infrastructure: Infrastructure,
    pub machine_image: String,
    pub instance_type: String,
    pub project: Option<String>,
    pub placement: Placement,
    pub access: CloudAccess,
}

/// Where the deployment lands.
#[derive(Clone)]
pub enum DeployTarget {
    /// Pre-existing virtual machines reachable over SSH.
    Cluster {
        ips_yaml: String,
        root_password: String,
    },
    /// Machines provisioned on an IaaS.
    Cloud(CloudSpec),
}

impl fmt::Debug for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster { ips_yaml, .. } => f
                .debug_struct("Cluster")
                .field("ips_yaml", ips_yaml)
                .field("root_password", &"[REDACTED]")
                .finish(),
            Self::Cloud(spec) => f.debug_tuple("Cloud").field(spec).finish(),
        }
    }
}

/// Immutable record of the inputs one job runs with. A termination job
/// carries the same record as the deployment it tears down, so the tools
/// get the same credentials both ways.
#[derive(Debug, Clone)]
pub struct DeployParams {
    pub credentials: AdminCredentials,
    pub target: DeployTarget,
}

/// A single asynchronous bring-up or tear-down run.
pub struct Job {
    pub identifier: String,
    pub kind: OperationKind,
    pub params: DeployParams,
    pub created_at: DateTime<Utc>,
    status: RwLock<StatusReport>,
}

impl Job {
    pub(crate) fn new(identifier: String, kind: OperationKind, params: DeployParams) -> Self {
        Self {
            identifier,
            kind,
            params,
            created_at: Utc::now(),
            status: RwLock::new(StatusReport::pending()),
        }
    }

    /// Snapshot the current status. Never blocks on the job's execution.
    pub async fn status(&self) -> StatusReport {
        self.status.read().await.clone()
    }

    pub(crate) async fn set_status(&self, status: JobState, message: impl Into<String>) {
        let mut guard = self.status.write().await;
        *guard = StatusReport {
            status,
            message: message.into(),
        };
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_params() -> DeployParams {
        DeployParams {
            credentials: AdminCredentials {
                email: "admin@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            target: DeployTarget::Cluster {
                ips_yaml: "controller: 10.0.0.1".to_string(),
                root_password: "rootpw".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn new_job_is_pending() {
        let job = Job::new("a1".to_string(), OperationKind::Deploy, cluster_params());
        let report = job.status().await;
        assert_eq!(report.status, JobState::Pending);
    }

    #[tokio::test]
    async fn status_transitions_are_observable() {
        let job = Job::new("a1".to_string(), OperationKind::Deploy, cluster_params());
        job.set_status(JobState::Failed, "tools exited with status 1")
            .await;
        let report = job.status().await;
        assert_eq!(report.status, JobState::Failed);
        assert_eq!(report.message, "tools exited with status 1");
    }

    #[test]
    fn params_debug_never_shows_passwords() {
        let params = cluster_params();
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("rootpw"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn job_state_serializes_snake_case() {
        let report = StatusReport {
            status: JobState::Running,
            message: "deploying".to_string(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "running");
    }
}
