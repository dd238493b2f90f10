use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Optional YAML file overriding the built-in component catalog.
    pub catalog_path: Option<PathBuf>,
    /// Directory holding the Ansible playbooks invoked by playbook actions.
    pub playbook_dir: PathBuf,
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        Self {
            catalog_path: env::var("THARNAX_CATALOG_PATH").ok().map(PathBuf::from),
            playbook_dir: env::var("THARNAX_PLAYBOOK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ansible")),
        }
    }
}
