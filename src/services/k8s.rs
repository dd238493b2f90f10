use std::collections::HashMap;

use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::{
    api::{Api, ListParams},
    config::{Config, KubeConfigOptions, Kubeconfig},
    Client,
};
use serde::Serialize;

use crate::config::CONFIG;
use crate::error::Result;

/// Kubernetes client manager
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a new Kubernetes client
    pub async fn new() -> Result<Self> {
        let client = if CONFIG.kubernetes.in_cluster {
            let config = Config::incluster()?;
            Client::try_from(config)?
        } else if let Some(ref kubeconfig_path) = CONFIG.kubernetes.kubeconfig_path {
            let kubeconfig = Kubeconfig::read_from(kubeconfig_path)?;
            let config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
            Client::try_from(config)?
        } else {
            Client::try_default().await?
        };

        Ok(Self { client })
    }

    /// Get the Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Summarize the cluster for the dashboard status card.
    pub async fn cluster_summary(&self) -> Result<ClusterSummary> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = nodes.list(&ListParams::default()).await?;

        let version = node_list
            .items
            .first()
            .and_then(|n| n.status.as_ref())
            .and_then(|s| s.node_info.as_ref())
            .map(|info| info.kubelet_version.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let pods: Api<Pod> = Api::all(self.client.clone());
        let pod_list = pods.list(&ListParams::default()).await?;

        Ok(ClusterSummary {
            node_count: node_list.items.len(),
            pod_count: pod_list.items.len(),
            version,
        })
    }

    /// InternalIP of the first node, used as a fallback when a LoadBalancer
    /// has no ingress IP yet.
    pub async fn node_internal_ip(&self) -> Option<String> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = nodes.list(&ListParams::default()).await.ok()?;

        node_list
            .items
            .first()
            .and_then(|n| n.status.as_ref())
            .and_then(|s| s.addresses.as_ref())
            .and_then(|addrs| {
                addrs
                    .iter()
                    .find(|a| a.type_ == "InternalIP")
                    .map(|a| a.address.clone())
            })
    }

    /// Discover reachable URLs for the services in a namespace. LoadBalancer
    /// ingress IPs are preferred; NodePort services fall back to a node IP.
    pub async fn discover_access_urls(&self, namespace: &str) -> HashMap<String, String> {
        let mut urls = HashMap::new();

        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = match services.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(e) => {
                tracing::debug!("Could not list services in '{}': {}", namespace, e);
                return urls;
            }
        };

        let node_ip = self.node_internal_ip().await;

        for svc in list.items {
            let Some(name) = svc.metadata.name.clone() else {
                continue;
            };
            let Some(spec) = svc.spec.as_ref() else {
                continue;
            };
            let ports = spec.ports.clone().unwrap_or_default();
            let Some(port) = ports.first() else {
                continue;
            };

            match spec.type_.as_deref() {
                Some("LoadBalancer") => {
                    let ingress_ip = svc
                        .status
                        .as_ref()
                        .and_then(|s| s.load_balancer.as_ref())
                        .and_then(|lb| lb.ingress.as_ref())
                        .and_then(|ing| ing.first())
                        .and_then(|i| i.ip.clone());

                    if let Some(ip) = ingress_ip {
                        urls.insert(name, format!("http://{}:{}", ip, port.port));
                    } else if let (Some(ip), Some(node_port)) = (&node_ip, port.node_port) {
                        // LoadBalancer pending, use node IP fallback
                        urls.insert(name, format!("http://{}:{}", ip, node_port));
                    }
                }
                Some("NodePort") => {
                    if let (Some(ip), Some(node_port)) = (&node_ip, port.node_port) {
                        urls.insert(name, format!("http://{}:{}", ip, node_port));
                    }
                }
                _ => {}
            }
        }

        urls
    }
}

/// Cluster-wide status summary returned by `GET /api/cluster/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub node_count: usize,
    pub pod_count: usize,
    pub version: String,
}
