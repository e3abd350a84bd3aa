//! Cluster control backed by an external tools command.
//!
//! One process per run: `<command> up ...` or `<command> down ...`.
//! Non-secret parameters travel as arguments; passwords and access keys
//! are injected into the child's environment so they never show up in a
//! process listing.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::cluster::{ClusterControl, ClusterError};
use crate::config::ProvisionerConfig;
use crate::jobs::{CloudAccess, DeployParams, DeployTarget, Placement};

pub struct CommandClusterControl {
    config: ProvisionerConfig,
}

impl CommandClusterControl {
    pub fn new(config: ProvisionerConfig) -> Self {
        Self { config }
    }

    /// Write a hosts layout to the scratch directory for one run.
    fn write_hosts_file(&self, identifier: &str, ips_yaml: &str) -> Result<PathBuf, ClusterError> {
        std::fs::create_dir_all(&self.config.scratch_dir).map_err(|e| {
            ClusterError::SpawnFailed {
                reason: format!("could not create scratch dir: {}", e),
            }
        })?;
        let path = self
            .config
            .scratch_dir
            .join(format!("{}-ips.yaml", identifier));
        std::fs::write(&path, ips_yaml).map_err(|e| ClusterError::SpawnFailed {
            reason: format!("could not write hosts layout: {}", e),
        })?;
        Ok(path)
    }

    async fn run(
        &self,
        args: Vec<String>,
        env: Vec<(&'static str, String)>,
    ) -> Result<String, ClusterError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&args);
        // Inject credentials into the child environment without mutating
        // the global process env (unsafe in multi-threaded programs).
        for (key, value) in env {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|e| ClusterError::SpawnFailed {
            reason: format!("failed to spawn {}: {}", self.config.command, e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output")
                .trim()
                .to_string();
            return Err(ClusterError::ExecutionFailed {
                reason: format!("{} (exit {})", detail, output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("completed")
            .trim()
            .to_string();
        Ok(message)
    }
}

#[async_trait]
impl ClusterControl for CommandClusterControl {
    async fn bring_up(
        &self,
        identifier: &str,
        params: &DeployParams,
    ) -> Result<String, ClusterError> {
        let mut args = vec![
            "up".to_string(),
            "--keyname".to_string(),
            identifier.to_string(),
            "--admin-email".to_string(),
            params.credentials.email.clone(),
        ];
        let mut env = vec![(
            "SKYLIFT_ADMIN_PASSWORD",
            params.credentials.password.clone(),
        )];

        match &params.target {
            DeployTarget::Cluster {
                ips_yaml,
                root_password,
            } => {
                let hosts = self.write_hosts_file(identifier, ips_yaml)?;
                args.push("--ips".to_string());
                args.push(hosts.display().to_string());
                env.push(("SKYLIFT_ROOT_PASSWORD", root_password.clone()));
            }
            DeployTarget::Cloud(spec) => {
                args.push("--infrastructure".to_string());
                args.push(spec.infrastructure.as_str().to_string());
                args.push("--machine".to_string());
                args.push(spec.machine_image.clone());
                args.push("--instance-type".to_string());
                args.push(spec.instance_type.clone());
                if let Some(project) = &spec.project {
                    args.push("--project".to_string());
                    args.push(project.clone());
                }

                match &spec.placement {
                    Placement::Simple { max_nodes } => {
                        // min is collapsed to max, matching what the web
                        // form submits for simple placements.
                        args.push("--min".to_string());
                        args.push(max_nodes.to_string());
                        args.push("--max".to_string());
                        args.push(max_nodes.to_string());
                    }
                    Placement::Advanced { ips_yaml } => {
                        let hosts = self.write_hosts_file(identifier, ips_yaml)?;
                        args.push("--ips".to_string());
                        args.push(hosts.display().to_string());
                    }
                }

                push_access(&mut args, &mut env, &spec.access);
            }
        }

        tracing::info!(keyname = %identifier, command = %self.config.command, "Running bring-up");
        self.run(args, env).await
    }

    async fn tear_down(
        &self,
        identifier: &str,
        params: &DeployParams,
    ) -> Result<String, ClusterError> {
        let mut args = vec![
            "down".to_string(),
            "--keyname".to_string(),
            identifier.to_string(),
        ];
        let mut env = Vec::new();

        if let DeployTarget::Cloud(spec) = &params.target {
            args.push("--infrastructure".to_string());
            args.push(spec.infrastructure.as_str().to_string());
            push_access(&mut args, &mut env, &spec.access);
        }

        tracing::info!(keyname = %identifier, command = %self.config.command, "Running tear-down");
        self.run(args, env).await
    }
}

fn push_access(
    args: &mut Vec<String>,
    env: &mut Vec<(&'static str, String)>,
    access: &CloudAccess,
) {
    match access {
        CloudAccess::Keys {
            access_key,
            secret_key,
            endpoint_url,
        } => {
            env.push(("SKYLIFT_ACCESS_KEY", access_key.clone()));
            env.push(("SKYLIFT_SECRET_KEY", secret_key.clone()));
            if let Some(url) = endpoint_url {
                args.push("--endpoint-url".to_string());
                args.push(url.clone());
            }
        }
        CloudAccess::DelegatedCredentials { path } => {
            args.push("--oauth2-credentials".to_string());
            args.push(path.display().to_string());
        }
    }
}
