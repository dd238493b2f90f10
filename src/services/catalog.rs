use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Broad grouping used by the dashboard to arrange component cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Core,
    Storage,
    Dashboard,
    Gitops,
    App,
}

/// How ground truth is established for a component. Selected per component at
/// catalog-definition time; the engine only ever sees the resulting
/// `ObservedState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeSpec {
    /// systemd unit check on the host (the base K3s service).
    Service { unit: String },
    /// Namespace existence only.
    Namespace { namespace: String },
    /// Namespace existence plus deployment readiness.
    Workload { namespace: String },
    /// Sync/health fields of an Argo CD Application.
    ArgoApp { name: String, namespace: String },
    /// Filesystem existence (installer binaries, scripts).
    Path { path: String },
}

/// External-collaborator action used to install/uninstall the component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Ansible playbooks, relative to the configured playbook directory.
    Playbook { install: String, uninstall: String },
    /// Helm chart deployed into its own namespace.
    Helm { chart: String, namespace: String },
    /// Raw manifest applied/deleted with kubectl.
    Manifest { url: String, namespace: String },
}

impl ActionSpec {
    /// Namespace the action deploys into, when it has one.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            ActionSpec::Playbook { .. } => None,
            ActionSpec::Helm { namespace, .. } | ActionSpec::Manifest { namespace, .. } => {
                Some(namespace)
            }
        }
    }
}

/// A named, independently manageable unit tracked by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    /// Protected components cannot be uninstalled through this mechanism.
    #[serde(default)]
    pub protected: bool,
    /// Components that must be Installed before this one may be.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub probe: ProbeSpec,
    pub action: ActionSpec,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    components: Vec<Component>,
}

/// Static registry of all manageable components. Built once at startup and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ComponentCatalog {
    components: HashMap<String, Component>,
    order: Vec<String>,
}

impl ComponentCatalog {
    /// Build a catalog from an explicit component list. Dangling `depends_on`
    /// references are logged and dropped rather than failing startup.
    pub fn new(components: Vec<Component>) -> Self {
        let order: Vec<String> = components.iter().map(|c| c.id.clone()).collect();
        let mut map: HashMap<String, Component> = components
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let known: Vec<String> = map.keys().cloned().collect();
        for component in map.values_mut() {
            component.depends_on.retain(|dep| {
                let ok = known.contains(dep);
                if !ok {
                    tracing::warn!(
                        "Component '{}' depends on unknown component '{}', ignoring",
                        component.id,
                        dep
                    );
                }
                ok
            });
        }

        Self {
            components: map,
            order,
        }
    }

    /// Parse a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        Ok(Self::new(file.components))
    }

    /// Load a catalog from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// The built-in catalog covering the stock Tharnax stack.
    pub fn defaults() -> Self {
        Self::new(vec![
            Component {
                id: "k3s".to_string(),
                display_name: "K3s".to_string(),
                description: "Lightweight Kubernetes cluster".to_string(),
                category: Category::Core,
                protected: true,
                depends_on: vec![],
                probe: ProbeSpec::Service {
                    unit: "k3s".to_string(),
                },
                action: ActionSpec::Playbook {
                    install: "k3s-install.yml".to_string(),
                    uninstall: "k3s-uninstall.yml".to_string(),
                },
            },
            Component {
                id: "nfs".to_string(),
                display_name: "NFS Storage".to_string(),
                description: "NFS server and dynamic volume provisioner".to_string(),
                category: Category::Storage,
                protected: false,
                depends_on: vec!["k3s".to_string()],
                probe: ProbeSpec::Service {
                    unit: "nfs-server".to_string(),
                },
                action: ActionSpec::Playbook {
                    install: "nfs-install.yml".to_string(),
                    uninstall: "nfs-uninstall.yml".to_string(),
                },
            },
            Component {
                id: "ui".to_string(),
                display_name: "Tharnax UI".to_string(),
                description: "Web dashboard for the cluster".to_string(),
                category: Category::Dashboard,
                protected: false,
                depends_on: vec!["k3s".to_string()],
                probe: ProbeSpec::Workload {
                    namespace: "tharnax".to_string(),
                },
                action: ActionSpec::Helm {
                    chart: "charts/tharnax-ui".to_string(),
                    namespace: "tharnax".to_string(),
                },
            },
            Component {
                id: "argocd".to_string(),
                display_name: "Argo CD".to_string(),
                description: "GitOps continuous delivery tool for Kubernetes".to_string(),
                category: Category::Gitops,
                protected: true,
                depends_on: vec!["k3s".to_string()],
                probe: ProbeSpec::Workload {
                    namespace: "argocd".to_string(),
                },
                action: ActionSpec::Manifest {
                    url: "https://raw.githubusercontent.com/argoproj/argo-cd/stable/manifests/install.yaml"
                        .to_string(),
                    namespace: "argocd".to_string(),
                },
            },
            Component {
                id: "monitoring".to_string(),
                display_name: "Monitoring Stack".to_string(),
                description: "Prometheus and Grafana monitoring stack".to_string(),
                category: Category::App,
                protected: false,
                depends_on: vec!["k3s".to_string(), "argocd".to_string()],
                probe: ProbeSpec::ArgoApp {
                    name: "monitoring".to_string(),
                    namespace: "argocd".to_string(),
                },
                action: ActionSpec::Manifest {
                    url: "manifests/monitoring-app.yaml".to_string(),
                    namespace: "argocd".to_string(),
                },
            },
            Component {
                id: "jellyfin".to_string(),
                display_name: "Jellyfin".to_string(),
                description: "Free software media system".to_string(),
                category: Category::App,
                protected: false,
                depends_on: vec!["k3s".to_string()],
                probe: ProbeSpec::Workload {
                    namespace: "jellyfin".to_string(),
                },
                action: ActionSpec::Helm {
                    chart: "charts/jellyfin".to_string(),
                    namespace: "jellyfin".to_string(),
                },
            },
            Component {
                id: "sonarr".to_string(),
                display_name: "Sonarr".to_string(),
                description: "TV series management".to_string(),
                category: Category::App,
                protected: false,
                depends_on: vec!["k3s".to_string()],
                probe: ProbeSpec::Workload {
                    namespace: "sonarr".to_string(),
                },
                action: ActionSpec::Helm {
                    chart: "charts/sonarr".to_string(),
                    namespace: "sonarr".to_string(),
                },
            },
        ])
    }

    /// Load from the configured YAML path, falling back to the built-ins.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(p) => match Self::from_file(p) {
                Ok(catalog) => {
                    tracing::info!("Loaded {} components from {}", catalog.len(), p.display());
                    catalog
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load catalog from {}: {}. Using built-in defaults.",
                        p.display(),
                        e
                    );
                    Self::defaults()
                }
            },
            None => Self::defaults(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    /// All components in declaration order.
    pub fn all(&self) -> Vec<&Component> {
        self.order
            .iter()
            .filter_map(|id| self.components.get(id))
            .collect()
    }

    /// Components that declare `id` in their `depends_on` list.
    pub fn dependents_of(&self, id: &str) -> Vec<&Component> {
        self.all()
            .into_iter()
            .filter(|c| c.depends_on.iter().any(|d| d == id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
