use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tharnax::config::CONFIG;
use tharnax::endpoints::create_router;
use tharnax::migrations::Migrator;
use tharnax::services::{
    ClusterProber, CommandRunner, ComponentCatalog, K8sClient, LifecycleEngine, StateStore,
};
use tharnax::state::{AppState, SharedK8sClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "tharnax={},tower_http=debug",
                    CONFIG.log_level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tharnax backend v{}", env!("CARGO_PKG_VERSION"));

    // Connect the state store and bring the schema up to date
    let db = Database::connect(&CONFIG.database.url).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("State store ready at {}", CONFIG.database.url);

    // Create Kubernetes client
    let k8s_client: SharedK8sClient = match K8sClient::new().await {
        Ok(client) => {
            tracing::info!("Kubernetes client initialized");
            Arc::new(RwLock::new(Some(client)))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize Kubernetes client: {}. Cluster probes will report unknown.",
                e
            );
            Arc::new(RwLock::new(None))
        }
    };

    // Load the component catalog
    let catalog = Arc::new(ComponentCatalog::load(CONFIG.catalog.catalog_path.as_deref()));
    tracing::info!("Component catalog loaded ({} components)", catalog.len());

    // Wire up the lifecycle engine
    let store = StateStore::new(db.clone());
    let prober = Arc::new(ClusterProber::new(
        k8s_client.clone(),
        CONFIG.lifecycle.probe_timeout,
    ));
    let runner = Arc::new(CommandRunner::new(
        k8s_client.clone(),
        CONFIG.catalog.playbook_dir.clone(),
    ));
    let engine = LifecycleEngine::new(
        catalog.clone(),
        store,
        prober,
        runner,
        CONFIG.lifecycle.clone(),
    );

    // Seed records from ground truth before serving any status
    if let Err(e) = engine.reconcile_all().await {
        tracing::warn!("Initial reconcile failed: {}", e);
    }

    let state = AppState::new(db, k8s_client, catalog, engine);
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", CONFIG.server.host, CONFIG.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the main application router
fn create_app(state: AppState) -> Router {
    // Permissive CORS unless origins are configured
    let cors = if CONFIG.server.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = CONFIG
            .server
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
