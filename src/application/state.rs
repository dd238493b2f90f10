use std::sync::Arc;
use tokio::sync::RwLock;

use sea_orm::DatabaseConnection;

use crate::services::catalog::ComponentCatalog;
use crate::services::k8s::K8sClient;
use crate::services::lifecycle::LifecycleEngine;

/// Database connection type alias
pub type DbConn = DatabaseConnection;

/// Shared K8s client state
pub type SharedK8sClient = Arc<RwLock<Option<K8sClient>>>;

/// Application state containing all shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub k8s_client: SharedK8sClient,
    pub catalog: Arc<ComponentCatalog>,
    pub engine: LifecycleEngine,
}

impl AppState {
    pub fn new(
        db: DbConn,
        k8s_client: SharedK8sClient,
        catalog: Arc<ComponentCatalog>,
        engine: LifecycleEngine,
    ) -> Self {
        Self {
            db,
            k8s_client,
            catalog,
            engine,
        }
    }
}
