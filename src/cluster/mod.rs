//! Boundary to the external cluster tools.
//!
//! The console never provisions anything itself; it hands the parameters
//! record to whatever implements [`ClusterControl`] and records the
//! outcome. Both operations are long-running, single-shot, and
//! non-retrying.

mod command;

pub use command::CommandClusterControl;

use async_trait::async_trait;

use crate::jobs::DeployParams;

/// Failures reported by the cluster tools.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClusterError {
    #[error("cluster tools failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("could not launch cluster tools: {reason}")]
    SpawnFailed { reason: String },
}

/// The capability that performs the real infrastructure work.
///
/// On success both operations yield a human-readable completion message
/// that lands in the job's status detail.
#[async_trait]
pub trait ClusterControl: Send + Sync {
    async fn bring_up(&self, identifier: &str, params: &DeployParams)
        -> Result<String, ClusterError>;

    async fn tear_down(&self, identifier: &str, params: &DeployParams)
        -> Result<String, ClusterError>;
}
