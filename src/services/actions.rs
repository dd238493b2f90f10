use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams};
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::services::catalog::{ActionSpec, Component, ProbeSpec};
use crate::state::SharedK8sClient;

/// Result of a successful install action.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    /// Named endpoint -> URL mapping discovered after the action, surfaced on
    /// the component's InstallRecord.
    pub access_urls: HashMap<String, String>,
}

/// The external collaborator seam: runs the actual install/uninstall/restart
/// against Ansible, Helm, or kubectl. Swapped for a double in tests.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn install(&self, component: &Component) -> Result<ActionOutcome>;
    async fn uninstall(&self, component: &Component) -> Result<()>;
    async fn restart(&self, component: &Component) -> Result<()>;
}

/// Production runner shelling out to the cluster tooling.
pub struct CommandRunner {
    k8s: SharedK8sClient,
    playbook_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(k8s: SharedK8sClient, playbook_dir: PathBuf) -> Self {
        Self { k8s, playbook_dir }
    }

    async fn run_command(&self, program: &str, args: &[&str]) -> Result<String> {
        tracing::debug!("Running: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| AppError::ActionFailed(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ActionFailed(format!(
                "{} failed: {}",
                program,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_playbook(&self, playbook: &str) -> Result<()> {
        let path = self.playbook_dir.join(playbook);
        let path_str = path.to_string_lossy().to_string();
        self.run_command("ansible-playbook", &[path_str.as_str()])
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let guard = self.k8s.read().await;
        let Some(k8s) = guard.as_ref() else {
            return Err(AppError::ServiceUnavailable(
                "Kubernetes client not available".to_string(),
            ));
        };

        let namespaces: Api<Namespace> = Api::all(k8s.client().clone());
        match namespaces.delete(namespace, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(AppError::ActionFailed(format!(
                "failed to delete namespace '{}': {}",
                namespace, e
            ))),
        }
    }

    async fn discover_urls(&self, namespace: Option<&str>) -> HashMap<String, String> {
        let Some(namespace) = namespace else {
            return HashMap::new();
        };

        let guard = self.k8s.read().await;
        match guard.as_ref() {
            Some(k8s) => k8s.discover_access_urls(namespace).await,
            None => HashMap::new(),
        }
    }
}

#[async_trait]
impl ActionRunner for CommandRunner {
    async fn install(&self, component: &Component) -> Result<ActionOutcome> {
        match &component.action {
            ActionSpec::Playbook { install, .. } => {
                self.run_playbook(install).await?;
            }
            ActionSpec::Helm { chart, namespace } => {
                self.run_command(
                    "helm",
                    &[
                        "upgrade",
                        "--install",
                        &component.id,
                        chart,
                        "-n",
                        namespace,
                        "--create-namespace",
                    ],
                )
                .await?;
            }
            ActionSpec::Manifest { url, namespace } => {
                self.run_command(
                    "kubectl",
                    &["apply", "-n", namespace, "-f", url],
                )
                .await?;
            }
        }

        let access_urls = self.discover_urls(component.action.namespace()).await;
        Ok(ActionOutcome { access_urls })
    }

    async fn uninstall(&self, component: &Component) -> Result<()> {
        match &component.action {
            ActionSpec::Playbook { uninstall, .. } => {
                self.run_playbook(uninstall).await?;
            }
            ActionSpec::Helm { namespace, .. } => {
                // Ignore helm's exit status: the release may already be gone
                // while the namespace still lingers.
                let _ = self
                    .run_command("helm", &["uninstall", &component.id, "-n", namespace])
                    .await;
                self.delete_namespace(namespace).await?;
            }
            ActionSpec::Manifest { url, namespace } => {
                self.run_command(
                    "kubectl",
                    &["delete", "-n", namespace, "-f", url, "--ignore-not-found"],
                )
                .await?;
                self.delete_namespace(namespace).await?;
            }
        }

        Ok(())
    }

    async fn restart(&self, component: &Component) -> Result<()> {
        // Host services restart through systemd; everything else through a
        // rollout restart of the component's namespace.
        if let ProbeSpec::Service { unit } = &component.probe {
            self.run_command("systemctl", &["restart", unit]).await?;
            return Ok(());
        }

        match component.action.namespace() {
            Some(namespace) => {
                self.run_command(
                    "kubectl",
                    &["-n", namespace, "rollout", "restart", "deployment"],
                )
                .await?;
                Ok(())
            }
            None => Err(AppError::ActionFailed(format!(
                "component '{}' has no restartable target",
                component.id
            ))),
        }
    }
}
