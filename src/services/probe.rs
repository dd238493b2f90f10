use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::services::catalog::{Component, ProbeSpec};
use crate::state::SharedK8sClient;

/// Whether the external collaborator reports the component as present.
/// `Unknown` is returned when the check itself could not complete (timeout,
/// unreachable API) and must never be treated as either answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
    Unknown,
}

/// Ground-truth answer for one component, independent of anything persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub presence: Presence,
    pub healthy: bool,
    pub detail: String,
}

impl ObservedState {
    pub fn present(healthy: bool, detail: impl Into<String>) -> Self {
        Self {
            presence: Presence::Present,
            healthy,
            detail: detail.into(),
        }
    }

    pub fn absent(detail: impl Into<String>) -> Self {
        Self {
            presence: Presence::Absent,
            healthy: false,
            detail: detail.into(),
        }
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            presence: Presence::Unknown,
            healthy: false,
            detail: detail.into(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.presence == Presence::Present
    }

    pub fn is_absent(&self) -> bool {
        self.presence == Presence::Absent
    }

    pub fn is_unknown(&self) -> bool {
        self.presence == Presence::Unknown
    }
}

/// Side-effect-free ground-truth check. The engine only ever talks to this
/// contract; the per-component strategy lives in the catalog's `ProbeSpec`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, component: &Component) -> ObservedState;
}

/// Production prober dispatching on the component's `ProbeSpec`. Every check
/// is bounded by a timeout; a timed-out check reports `Unknown` rather than
/// blocking the caller.
pub struct ClusterProber {
    k8s: SharedK8sClient,
    timeout: Duration,
}

impl ClusterProber {
    pub fn new(k8s: SharedK8sClient, timeout: Duration) -> Self {
        Self { k8s, timeout }
    }

    async fn run(&self, component: &Component) -> ObservedState {
        match &component.probe {
            ProbeSpec::Service { unit } => probe_service(unit).await,
            ProbeSpec::Namespace { namespace } => self.probe_namespace(namespace).await,
            ProbeSpec::Workload { namespace } => self.probe_workload(namespace).await,
            ProbeSpec::ArgoApp { name, namespace } => self.probe_argo_app(name, namespace).await,
            ProbeSpec::Path { path } => probe_path(path).await,
        }
    }

    async fn probe_namespace(&self, namespace: &str) -> ObservedState {
        let guard = self.k8s.read().await;
        let Some(k8s) = guard.as_ref() else {
            return ObservedState::unknown("kubernetes client unavailable");
        };

        let namespaces: Api<Namespace> = Api::all(k8s.client().clone());
        match namespaces.get(namespace).await {
            Ok(_) => ObservedState::present(true, format!("namespace '{}' exists", namespace)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                ObservedState::absent(format!("namespace '{}' not found", namespace))
            }
            Err(e) => ObservedState::unknown(format!("namespace check failed: {}", e)),
        }
    }

    async fn probe_workload(&self, namespace: &str) -> ObservedState {
        let guard = self.k8s.read().await;
        let Some(k8s) = guard.as_ref() else {
            return ObservedState::unknown("kubernetes client unavailable");
        };

        let namespaces: Api<Namespace> = Api::all(k8s.client().clone());
        match namespaces.get(namespace).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                return ObservedState::absent(format!("namespace '{}' not found", namespace));
            }
            Err(e) => return ObservedState::unknown(format!("namespace check failed: {}", e)),
        }

        let deployments: Api<Deployment> = Api::namespaced(k8s.client().clone(), namespace);
        let list = match deployments.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(e) => return ObservedState::unknown(format!("deployment list failed: {}", e)),
        };

        if list.items.is_empty() {
            return ObservedState::present(false, "no workloads deployed yet");
        }

        let mut unready = Vec::new();
        for deploy in &list.items {
            let name = deploy.metadata.name.clone().unwrap_or_default();
            let replicas = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            let ready = deploy
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0);

            if ready < replicas {
                unready.push(format!("{} ({}/{})", name, ready, replicas));
            }
        }

        if unready.is_empty() {
            ObservedState::present(true, "all workloads ready")
        } else {
            ObservedState::present(false, format!("waiting on: {}", unready.join(", ")))
        }
    }

    async fn probe_argo_app(&self, name: &str, namespace: &str) -> ObservedState {
        let guard = self.k8s.read().await;
        let Some(k8s) = guard.as_ref() else {
            return ObservedState::unknown("kubernetes client unavailable");
        };

        let path = format!(
            "/apis/argoproj.io/v1alpha1/namespaces/{}/applications/{}",
            namespace, name
        );

        let request = match http::Request::get(path.as_str()).body(vec![]) {
            Ok(req) => req,
            Err(e) => return ObservedState::unknown(format!("bad request: {}", e)),
        };

        match k8s.client().request::<ArgoApplication>(request).await {
            Ok(app) => {
                let sync = app
                    .status
                    .sync
                    .and_then(|s| s.status)
                    .unwrap_or_else(|| "Unknown".to_string());
                let health = app
                    .status
                    .health
                    .and_then(|h| h.status)
                    .unwrap_or_else(|| "Unknown".to_string());

                let healthy = sync == "Synced" && health == "Healthy";
                ObservedState::present(healthy, format!("sync={}, health={}", sync, health))
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                ObservedState::absent(format!("application '{}' not found", name))
            }
            Err(e) => ObservedState::unknown(format!("application check failed: {}", e)),
        }
    }
}

#[async_trait]
impl Prober for ClusterProber {
    async fn probe(&self, component: &Component) -> ObservedState {
        match tokio::time::timeout(self.timeout, self.run(component)).await {
            Ok(observed) => observed,
            Err(_) => ObservedState::unknown("probe timed out"),
        }
    }
}

async fn probe_service(unit: &str) -> ObservedState {
    let status = Command::new("systemctl")
        .args(["is-active", "--quiet", unit])
        .status()
        .await;

    match status {
        Ok(s) if s.success() => ObservedState::present(true, format!("unit '{}' active", unit)),
        Ok(_) => ObservedState::absent(format!("unit '{}' not active", unit)),
        Err(e) => ObservedState::unknown(format!("systemctl failed: {}", e)),
    }
}

async fn probe_path(path: &str) -> ObservedState {
    match tokio::fs::metadata(path).await {
        Ok(_) => ObservedState::present(true, format!("'{}' exists", path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ObservedState::absent(format!("'{}' not found", path))
        }
        Err(e) => ObservedState::unknown(format!("stat failed: {}", e)),
    }
}

/// Minimal view of an Argo CD Application, fetched through the raw API path
/// so we do not carry the full CRD type.
#[derive(Deserialize)]
struct ArgoApplication {
    #[serde(default)]
    status: ArgoApplicationStatus,
}

#[derive(Deserialize, Default)]
struct ArgoApplicationStatus {
    sync: Option<ArgoSyncStatus>,
    health: Option<ArgoHealthStatus>,
}

#[derive(Deserialize)]
struct ArgoSyncStatus {
    status: Option<String>,
}

#[derive(Deserialize)]
struct ArgoHealthStatus {
    status: Option<String>,
}
