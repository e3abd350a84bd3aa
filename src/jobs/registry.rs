//! Concurrency-safe registries of in-flight jobs.
//!
//! Two independent maps, deployments and terminations, both keyed by the
//! caller-visible keyname. Entries are inserted before the start call
//! returns and never removed; a lookup either finds a fully-constructed
//! job or nothing. Losing the process loses the maps, which is the
//! deliberate durability trade-off: a restart cannot poll or terminate
//! jobs started before it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cluster::ClusterControl;
use crate::jobs::{DeployParams, Job, JobState, JobSummary, OperationKind, StatusReport};

/// Errors returned synchronously by registry operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown keyname {0}")]
    UnknownIdentifier(String),
}

/// Registry of deployment and termination jobs for one process.
pub struct JobRegistry {
    cluster: Arc<dyn ClusterControl>,
    deployments: RwLock<HashMap<String, Arc<Job>>>,
    terminations: RwLock<HashMap<String, Arc<Job>>>,
}

impl JobRegistry {
    pub fn new(cluster: Arc<dyn ClusterControl>) -> Self {
        Self {
            cluster,
            deployments: RwLock::new(HashMap::new()),
            terminations: RwLock::new(HashMap::new()),
        }
    }

    /// Start a deployment. Allocates a fresh keyname, registers the job in
    /// Pending state, and fires the work off onto the runtime. Returns the
    /// keyname immediately; progress is observable only through
    /// [`JobRegistry::deployment_status`].
    pub async fn start_deployment(&self, params: DeployParams) -> String {
        let identifier = generate_keyname();
        let job = Arc::new(Job::new(
            identifier.clone(),
            OperationKind::Deploy,
            params,
        ));

        self.deployments
            .write()
            .await
            .insert(identifier.clone(), Arc::clone(&job));

        tracing::info!(keyname = %identifier, "Registered deployment job");
        tokio::spawn(execute(job, Arc::clone(&self.cluster)));

        identifier
    }

    /// Start tearing down a previously deployed keyname. The termination
    /// job inherits the deployment's parameters so the tools see the same
    /// credentials both ways. Whoever presents the keyname holds the
    /// authority to terminate it; there is no further authorization.
    pub async fn start_termination(&self, identifier: &str) -> Result<(), RegistryError> {
        let params = {
            let deployments = self.deployments.read().await;
            let deploy_job = deployments
                .get(identifier)
                .ok_or_else(|| RegistryError::UnknownIdentifier(identifier.to_string()))?;
            deploy_job.params.clone()
        };

        let job = Arc::new(Job::new(
            identifier.to_string(),
            OperationKind::Terminate,
            params,
        ));

        self.terminations
            .write()
            .await
            .insert(identifier.to_string(), Arc::clone(&job));

        tracing::info!(keyname = %identifier, "Registered termination job");
        tokio::spawn(execute(job, Arc::clone(&self.cluster)));

        Ok(())
    }

    /// Status of a deployment job. Never blocks on the job itself.
    pub async fn deployment_status(&self, identifier: &str) -> Result<StatusReport, RegistryError> {
        let job = {
            let deployments = self.deployments.read().await;
            deployments
                .get(identifier)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownIdentifier(identifier.to_string()))?
        };
        Ok(job.status().await)
    }

    /// Status of a termination job.
    pub async fn termination_status(&self, identifier: &str) -> Result<StatusReport, RegistryError> {
        let job = {
            let terminations = self.terminations.read().await;
            terminations
                .get(identifier)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownIdentifier(identifier.to_string()))?
        };
        Ok(job.status().await)
    }

    /// Summaries of every deployment job this process has started.
    pub async fn list_deployments(&self) -> Vec<JobSummary> {
        let jobs: Vec<Arc<Job>> = self.deployments.read().await.values().cloned().collect();
        summarize(jobs).await
    }

    /// Summaries of every termination job this process has started.
    pub async fn list_terminations(&self) -> Vec<JobSummary> {
        let jobs: Vec<Arc<Job>> = self.terminations.read().await.values().cloned().collect();
        summarize(jobs).await
    }
}

async fn summarize(jobs: Vec<Arc<Job>>) -> Vec<JobSummary> {
    let mut out = Vec::with_capacity(jobs.len());
    for job in jobs {
        out.push(JobSummary {
            keyname: job.identifier.clone(),
            operation: job.kind.to_string(),
            created_at: job.created_at,
            report: job.status().await,
        });
    }
    out
}

/// Run one job to its terminal state. Collaborator failures are captured
/// into the job's status, never raised back through the registry.
async fn execute(job: Arc<Job>, cluster: Arc<dyn ClusterControl>) {
    let verb = match job.kind {
        OperationKind::Deploy => "Deploying",
        OperationKind::Terminate => "Terminating",
    };
    job.set_status(JobState::Running, format!("{}...", verb)).await;

    let outcome = match job.kind {
        OperationKind::Deploy => cluster.bring_up(&job.identifier, &job.params).await,
        OperationKind::Terminate => cluster.tear_down(&job.identifier, &job.params).await,
    };

    match outcome {
        Ok(message) => {
            tracing::info!(keyname = %job.identifier, operation = %job.kind, "Job succeeded");
            job.set_status(JobState::Succeeded, message).await;
        }
        Err(e) => {
            tracing::warn!(keyname = %job.identifier, operation = %job.kind, error = %e, "Job failed");
            job.set_status(JobState::Failed, e.to_string()).await;
        }
    }
}

/// Allocate a caller-visible keyname. Random, not sequential: the keyname
/// doubles as the authority to terminate the deployment it names. Starts
/// with a letter and contains no dashes so it passes provider name rules.
fn generate_keyname() -> String {
    format!("a{}", Uuid::new_v4().simple())
}
