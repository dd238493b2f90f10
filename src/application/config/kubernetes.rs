use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    pub kubeconfig_path: Option<PathBuf>,
    pub in_cluster: bool,
}

impl KubernetesConfig {
    pub fn from_env() -> Self {
        Self {
            kubeconfig_path: env::var("THARNAX_KUBECONFIG_PATH").ok().map(PathBuf::from),
            in_cluster: env::var("THARNAX_IN_CLUSTER")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}
