//! Test helpers and doubles shared by the integration tests.
//!
//! Provides an in-memory state store, a fake prober and a fake action runner
//! so lifecycle behaviour can be exercised without a cluster.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tokio::sync::RwLock;

use tharnax::config::lifecycle::LifecycleConfig;
use tharnax::error::Result;
use tharnax::migrations::Migrator;
use tharnax::services::{
    ActionOutcome, ActionRunner, ActionSpec, Category, Component, ComponentCatalog,
    ComponentStatus, InstallRecord, LifecycleEngine, ObservedState, ProbeSpec, Prober, StateStore,
};
use tharnax::state::{AppState, SharedK8sClient};

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

fn component(id: &str, category: Category, protected: bool, depends_on: &[&str]) -> Component {
    Component {
        id: id.to_string(),
        display_name: id.to_string(),
        description: format!("test component {}", id),
        category,
        protected,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        probe: ProbeSpec::Namespace {
            namespace: id.to_string(),
        },
        action: ActionSpec::Helm {
            chart: format!("charts/{}", id),
            namespace: id.to_string(),
        },
    }
}

/// Small catalog mirroring the default stack: a base component, a storage
/// component depending on it, a protected GitOps controller and one app.
pub fn test_catalog() -> ComponentCatalog {
    ComponentCatalog::new(vec![
        component("k3s", Category::Core, false, &[]),
        component("nfs", Category::Storage, false, &["k3s"]),
        component("argocd", Category::Gitops, true, &["k3s"]),
        component("jellyfin", Category::App, false, &["k3s"]),
    ])
}

/// Prober double answering from an in-memory table. Components without an
/// entry are reported absent.
#[derive(Default)]
pub struct FakeProber {
    responses: Mutex<HashMap<String, ObservedState>>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, observed: ObservedState) {
        self.responses
            .lock()
            .unwrap()
            .insert(id.to_string(), observed);
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, component: &Component) -> ObservedState {
        self.responses
            .lock()
            .unwrap()
            .get(&component.id)
            .cloned()
            .unwrap_or_else(|| ObservedState::absent("not present in fake cluster"))
    }
}

/// Action runner double that counts invocations and, by default, updates the
/// fake prober the way the real collaborator would change ground truth.
pub struct FakeRunner {
    prober: Arc<FakeProber>,
    /// Simulated duration of each action.
    pub delay: Duration,
    /// When set, install actions return an error.
    pub fail_installs: AtomicBool,
    /// When cleared, actions no longer move the fake prober's ground truth
    /// (so verification failures can be exercised).
    pub sync_prober: AtomicBool,
    /// `access_urls` reported by successful install actions.
    install_urls: Mutex<HashMap<String, String>>,
    install_calls: Mutex<HashMap<String, u32>>,
    uninstall_calls: Mutex<HashMap<String, u32>>,
    restart_calls: Mutex<HashMap<String, u32>>,
}

impl FakeRunner {
    pub fn new(prober: Arc<FakeProber>) -> Self {
        Self::with_delay(prober, Duration::ZERO)
    }

    pub fn with_delay(prober: Arc<FakeProber>, delay: Duration) -> Self {
        Self {
            prober,
            delay,
            fail_installs: AtomicBool::new(false),
            sync_prober: AtomicBool::new(true),
            install_urls: Mutex::new(HashMap::new()),
            install_calls: Mutex::new(HashMap::new()),
            uninstall_calls: Mutex::new(HashMap::new()),
            restart_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_install_urls(&self, urls: &[(&str, &str)]) {
        let mut map = self.install_urls.lock().unwrap();
        map.clear();
        for (name, url) in urls {
            map.insert(name.to_string(), url.to_string());
        }
    }

    pub fn install_calls(&self, id: &str) -> u32 {
        *self.install_calls.lock().unwrap().get(id).unwrap_or(&0)
    }

    pub fn uninstall_calls(&self, id: &str) -> u32 {
        *self.uninstall_calls.lock().unwrap().get(id).unwrap_or(&0)
    }

    pub fn restart_calls(&self, id: &str) -> u32 {
        *self.restart_calls.lock().unwrap().get(id).unwrap_or(&0)
    }

    fn bump(map: &Mutex<HashMap<String, u32>>, id: &str) {
        *map.lock().unwrap().entry(id.to_string()).or_insert(0) += 1;
    }
}

#[async_trait]
impl ActionRunner for FakeRunner {
    async fn install(&self, component: &Component) -> Result<ActionOutcome> {
        Self::bump(&self.install_calls, &component.id);
        tokio::time::sleep(self.delay).await;

        if self.fail_installs.load(Ordering::SeqCst) {
            return Err(tharnax::error::AppError::ActionFailed(
                "simulated install failure".to_string(),
            ));
        }

        if self.sync_prober.load(Ordering::SeqCst) {
            self.prober
                .set(&component.id, ObservedState::present(true, "installed"));
        }
        Ok(ActionOutcome {
            access_urls: self.install_urls.lock().unwrap().clone(),
        })
    }

    async fn uninstall(&self, component: &Component) -> Result<()> {
        Self::bump(&self.uninstall_calls, &component.id);
        tokio::time::sleep(self.delay).await;

        if self.sync_prober.load(Ordering::SeqCst) {
            self.prober
                .set(&component.id, ObservedState::absent("uninstalled"));
        }
        Ok(())
    }

    async fn restart(&self, component: &Component) -> Result<()> {
        Self::bump(&self.restart_calls, &component.id);
        tokio::time::sleep(self.delay).await;

        if self.sync_prober.load(Ordering::SeqCst) {
            self.prober
                .set(&component.id, ObservedState::present(true, "restarted"));
        }
        Ok(())
    }
}

/// Everything a lifecycle test needs in one place.
pub struct Harness {
    pub db: DatabaseConnection,
    pub engine: LifecycleEngine,
    pub store: StateStore,
    pub catalog: Arc<ComponentCatalog>,
    pub prober: Arc<FakeProber>,
    pub runner: Arc<FakeRunner>,
}

/// Timing config scaled down so tests settle in milliseconds.
pub fn fast_config() -> LifecycleConfig {
    LifecycleConfig {
        probe_timeout: Duration::from_secs(1),
        operation_timeout: Duration::from_secs(5),
        retry_max: 3,
        retry_backoff: Duration::from_millis(10),
        poll_interval: Duration::from_millis(10),
    }
}

pub async fn harness() -> Harness {
    harness_with(fast_config(), Duration::ZERO).await
}

pub async fn harness_with(config: LifecycleConfig, action_delay: Duration) -> Harness {
    let db = create_test_db().await;
    let store = StateStore::new(db.clone());
    let catalog = Arc::new(test_catalog());
    let prober = Arc::new(FakeProber::new());
    let runner = Arc::new(FakeRunner::with_delay(prober.clone(), action_delay));
    let engine = LifecycleEngine::new(
        catalog.clone(),
        store.clone(),
        prober.clone(),
        runner.clone(),
        config,
    );

    Harness {
        db,
        engine,
        store,
        catalog,
        prober,
        runner,
    }
}

impl Harness {
    /// Axum application state backed by this harness (no cluster client).
    pub fn app_state(&self) -> AppState {
        let k8s: SharedK8sClient = Arc::new(RwLock::new(None));
        AppState::new(
            self.db.clone(),
            k8s,
            self.catalog.clone(),
            self.engine.clone(),
        )
    }

    /// Persist a terminal Installed record, as if the component had been set
    /// up in an earlier session.
    pub async fn mark_installed(&self, id: &str) {
        self.prober.set(id, ObservedState::present(true, "installed"));
        self.store
            .upsert(&InstallRecord::terminal(
                id,
                ComponentStatus::Installed,
                format!("{} is installed", id),
                HashMap::new(),
            ))
            .await
            .unwrap();
    }

    /// Poll until the component reaches a terminal (non-transitional) state
    /// and its operation slot is released.
    pub async fn wait_for_settled(&self, id: &str) -> InstallRecord {
        for _ in 0..500 {
            let record = self.engine.status(id).await.unwrap();
            if !record.status.is_transitional() && self.engine.operation(id).await.is_none() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("component '{}' never settled", id);
    }
}
