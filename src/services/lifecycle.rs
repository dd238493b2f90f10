use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::lifecycle::LifecycleConfig;
use crate::error::{AppError, Result};
use crate::services::actions::ActionRunner;
use crate::services::catalog::{Component, ComponentCatalog};
use crate::services::probe::{ObservedState, Presence, Prober};
use crate::services::store::{ComponentStatus, InstallRecord, StateStore};

/// The three intents a client can issue against a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Install,
    Uninstall,
    Restart,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Install => "install",
            OperationKind::Uninstall => "uninstall",
            OperationKind::Restart => "restart",
        }
    }

    fn transitional_status(&self) -> ComponentStatus {
        match self {
            OperationKind::Install => ComponentStatus::Installing,
            OperationKind::Uninstall => ComponentStatus::Uninstalling,
            OperationKind::Restart => ComponentStatus::Restarting,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight request against one component. At most one non-cancelled
/// operation exists per component at any time.
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: Uuid,
    pub component: String,
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
    pub attempt: u32,
    pub cancelled: bool,
}

/// Synchronous acknowledgment returned from `request_intent`. The operation
/// itself proceeds asynchronously; clients poll `status` until terminal.
#[derive(Debug, Clone, Serialize)]
pub struct IntentAck {
    pub status: IntentStatus,
    pub record: InstallRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Accepted,
    AlreadyProcessing,
}

/// State machine governing install/uninstall/restart transitions. All writes
/// for a component happen on the single worker task spawned for its
/// operation; concurrent intents against the same component are coalesced
/// into the in-flight operation rather than queued.
#[derive(Clone)]
pub struct LifecycleEngine {
    catalog: Arc<ComponentCatalog>,
    store: StateStore,
    prober: Arc<dyn Prober>,
    runner: Arc<dyn ActionRunner>,
    operations: Arc<RwLock<HashMap<String, Operation>>>,
    config: LifecycleConfig,
}

impl LifecycleEngine {
    pub fn new(
        catalog: Arc<ComponentCatalog>,
        store: StateStore,
        prober: Arc<dyn Prober>,
        runner: Arc<dyn ActionRunner>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            prober,
            runner,
            operations: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Seed every component's record from ground truth. Called once at
    /// startup: the initial state comes from an immediate probe, never from
    /// an assumption of NotInstalled, and transitional states left over from
    /// a crash are resolved here.
    pub async fn reconcile_all(&self) -> Result<()> {
        for component in self.catalog.all() {
            let existing = self.store.get(&component.id).await?;
            let observed = self.prober.probe(component).await;

            let record = match observed.presence {
                Presence::Present => InstallRecord::terminal(
                    &component.id,
                    ComponentStatus::Installed,
                    format!("{} is installed", component.display_name),
                    existing.map(|r| r.access_urls).unwrap_or_default(),
                ),
                Presence::Absent => InstallRecord::terminal(
                    &component.id,
                    ComponentStatus::NotInstalled,
                    format!("{} is not installed", component.display_name),
                    HashMap::new(),
                ),
                Presence::Unknown => match existing {
                    // A transitional record with no live operation is stale;
                    // surface it as an error the client can retry from.
                    Some(r) if r.status.is_transitional() => InstallRecord::error(
                        &component.id,
                        r.progress,
                        format!("interrupted {}; state unknown: {}", r.status, observed.detail),
                    ),
                    Some(r) => r,
                    None => InstallRecord::terminal(
                        &component.id,
                        ComponentStatus::NotInstalled,
                        format!("state unknown: {}", observed.detail),
                        HashMap::new(),
                    ),
                },
            };

            self.store.upsert(&record).await?;
            tracing::debug!(
                "Reconciled '{}': {} ({})",
                component.id,
                record.status,
                record.message
            );
        }

        Ok(())
    }

    /// Latest record for a component. Never blocks on an in-flight
    /// operation; the record is created lazily from a probe if the component
    /// has never been seen.
    pub async fn status(&self, id: &str) -> Result<InstallRecord> {
        let component = self.component(id)?;

        if let Some(record) = self.store.get(id).await? {
            return Ok(record);
        }

        let observed = self.prober.probe(component).await;
        let record = match observed.presence {
            Presence::Present => InstallRecord::terminal(
                id,
                ComponentStatus::Installed,
                format!("{} is installed", component.display_name),
                HashMap::new(),
            ),
            Presence::Absent => InstallRecord::terminal(
                id,
                ComponentStatus::NotInstalled,
                format!("{} is not installed", component.display_name),
                HashMap::new(),
            ),
            Presence::Unknown => InstallRecord::terminal(
                id,
                ComponentStatus::NotInstalled,
                format!("state unknown: {}", observed.detail),
                HashMap::new(),
            ),
        };
        self.store.upsert(&record).await?;
        Ok(record)
    }

    /// Records for every catalog component, in catalog order.
    pub async fn status_all(&self) -> Result<Vec<InstallRecord>> {
        let mut records = Vec::with_capacity(self.catalog.len());
        for component in self.catalog.all() {
            records.push(self.status(&component.id).await?);
        }
        Ok(records)
    }

    /// Validate and acknowledge an intent. Rejections (`Protected`,
    /// `DependencyUnmet`, `DependentsExist`, invalid restart state) are
    /// returned synchronously and mutate nothing; `Protected` is checked
    /// before anything else, so it holds even while an operation is in
    /// flight. An accepted intent spawns the worker task and returns
    /// immediately; a repeated intent while one is in flight is answered
    /// `AlreadyProcessing` without starting a second attempt.
    pub async fn request_intent(&self, id: &str, kind: OperationKind) -> Result<IntentAck> {
        let component = self.component(id)?.clone();

        // Protected does not depend on current status or in-flight work.
        if kind == OperationKind::Uninstall && component.protected {
            return Err(AppError::Protected(format!(
                "component '{}' cannot be uninstalled",
                id
            )));
        }

        // The operations map is the concurrency gate: validation, slot
        // claiming, and record seeding all happen under its write lock.
        // Only store lookups run while it is held, never probes.
        let mut operations = self.operations.write().await;

        if let Some(op) = operations.get(id) {
            if !op.cancelled {
                // The record is seeded under this lock when the slot is
                // claimed, so it reflects the in-flight operation.
                let record = match self.store.get(id).await? {
                    Some(record) => record,
                    None => InstallRecord::transitional(
                        id,
                        op.kind.transitional_status(),
                        5,
                        format!("Starting {} of {}", op.kind, component.display_name),
                    ),
                };
                return Ok(IntentAck {
                    status: IntentStatus::AlreadyProcessing,
                    record,
                });
            }
        }

        let mut preserved_urls = HashMap::new();

        match kind {
            OperationKind::Install => {
                for dep in &component.depends_on {
                    let installed = matches!(
                        self.store.get(dep).await?,
                        Some(r) if r.status == ComponentStatus::Installed
                    );
                    if !installed {
                        return Err(AppError::DependencyUnmet(format!(
                            "component '{}' requires '{}' to be installed first",
                            id, dep
                        )));
                    }
                }
            }
            OperationKind::Uninstall => {
                for dependent in self.catalog.dependents_of(id) {
                    let installed = matches!(
                        self.store.get(&dependent.id).await?,
                        Some(r) if r.status == ComponentStatus::Installed
                    );
                    if installed {
                        return Err(AppError::DependentsExist(format!(
                            "component '{}' is required by installed component '{}'",
                            id, dependent.id
                        )));
                    }
                }
            }
            OperationKind::Restart => {
                match self.store.get(id).await? {
                    Some(record) if record.status == ComponentStatus::Installed => {
                        // Keep the discovered URLs on the record through the
                        // restart.
                        preserved_urls = record.access_urls;
                    }
                    // Already restarting: no-op, report the current state.
                    Some(record) if record.status == ComponentStatus::Restarting => {
                        return Ok(IntentAck {
                            status: IntentStatus::AlreadyProcessing,
                            record,
                        });
                    }
                    other => {
                        let current = other
                            .map(|r| r.status)
                            .unwrap_or(ComponentStatus::NotInstalled);
                        return Err(AppError::Conflict(format!(
                            "component '{}' is {}, only installed components can be restarted",
                            id, current
                        )));
                    }
                }
            }
        }

        // Seed the record before the operation becomes visible so a
        // coalesced intent always observes the transitional state.
        let mut record = InstallRecord::transitional(
            id,
            kind.transitional_status(),
            5,
            format!("Starting {} of {}", kind, component.display_name),
        );
        record.access_urls = preserved_urls;
        self.store.upsert(&record).await?;

        let operation = Operation {
            id: Uuid::new_v4(),
            component: id.to_string(),
            kind,
            started_at: Utc::now(),
            attempt: 0,
            cancelled: false,
        };
        let op_id = operation.id;
        operations.insert(id.to_string(), operation);
        drop(operations);

        tracing::info!("Accepted {} of '{}' (operation {})", kind, id, op_id);

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_operation(component, kind, op_id).await;
        });

        Ok(IntentAck {
            status: IntentStatus::Accepted,
            record,
        })
    }

    /// The in-flight operation for a component, if any.
    pub async fn operation(&self, id: &str) -> Option<Operation> {
        self.operations.read().await.get(id).cloned()
    }

    /// Number of non-cancelled operations currently in flight.
    pub async fn operations_in_flight(&self) -> usize {
        self.operations
            .read()
            .await
            .values()
            .filter(|op| !op.cancelled)
            .count()
    }

    fn component(&self, id: &str) -> Result<&Component> {
        self.catalog
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Component '{}' not found", id)))
    }

    /// Worker body: runs the whole operation under the configured deadline,
    /// then releases the component's operation slot.
    async fn run_operation(self, component: Component, kind: OperationKind, op_id: Uuid) {
        let deadline = self.config.operation_timeout;
        let result = tokio::time::timeout(deadline, self.execute(&component, kind)).await;

        match result {
            Ok(Ok(())) => {
                tracing::info!("{} of '{}' completed", kind, component.id);
            }
            Ok(Err(e)) => {
                tracing::error!("{} of '{}' failed: {}", kind, component.id, e);
                let progress = self.last_progress(&component.id).await;
                let record = InstallRecord::error(
                    &component.id,
                    progress,
                    format!("{} of {} failed: {}", kind, component.display_name, e),
                );
                if let Err(e) = self.store.upsert(&record).await {
                    tracing::error!("Failed to persist error record for '{}': {}", component.id, e);
                }
            }
            Err(_) => {
                tracing::error!(
                    "{} of '{}' exceeded {:?}, forcing Error",
                    kind,
                    component.id,
                    deadline
                );
                self.mark_cancelled(&component.id, op_id).await;
                let progress = self.last_progress(&component.id).await;
                let record = InstallRecord::error(&component.id, progress, "operation timed out");
                if let Err(e) = self.store.upsert(&record).await {
                    tracing::error!("Failed to persist error record for '{}': {}", component.id, e);
                }
            }
        }

        // Release the slot so a fresh intent can be accepted.
        let mut operations = self.operations.write().await;
        if operations.get(&component.id).is_some_and(|op| op.id == op_id) {
            operations.remove(&component.id);
        }
    }

    async fn execute(&self, component: &Component, kind: OperationKind) -> Result<()> {
        match kind {
            OperationKind::Install => self.execute_install(component).await,
            OperationKind::Uninstall => self.execute_uninstall(component).await,
            OperationKind::Restart => self.execute_restart(component).await,
        }
    }

    async fn execute_install(&self, component: &Component) -> Result<()> {
        let id = &component.id;
        let mut last_error: Option<AppError> = None;

        for attempt in 1..=self.config.retry_max {
            if attempt > 1 {
                tokio::time::sleep(self.config.backoff_for_attempt(attempt - 1)).await;
            }
            self.bump_attempt(id, attempt).await;

            let record = InstallRecord::transitional(
                id,
                ComponentStatus::Installing,
                25,
                format!(
                    "Running install action (attempt {}/{})",
                    attempt, self.config.retry_max
                ),
            );
            self.store.upsert(&record).await?;

            let outcome = match self.runner.install(component).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Install action for '{}' failed (attempt {}): {}", id, attempt, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let observed = self
                .await_converged(component, ComponentStatus::Installing)
                .await;

            if observed.is_present() && observed.healthy {
                let record = InstallRecord::terminal(
                    id,
                    ComponentStatus::Installed,
                    format!("{} installed", component.display_name),
                    outcome.access_urls,
                );
                self.store.upsert(&record).await?;
                return Ok(());
            }

            tracing::warn!(
                "Install verification for '{}' failed (attempt {}): {}",
                id,
                attempt,
                observed.detail
            );
            last_error = Some(AppError::ActionFailed(format!(
                "verification failed: {}",
                observed.detail
            )));
        }

        Err(last_error.unwrap_or_else(|| AppError::ActionFailed("install failed".to_string())))
    }

    async fn execute_uninstall(&self, component: &Component) -> Result<()> {
        let id = &component.id;
        let mut last_error: Option<AppError> = None;

        for attempt in 1..=self.config.retry_max {
            if attempt > 1 {
                tokio::time::sleep(self.config.backoff_for_attempt(attempt - 1)).await;
            }
            self.bump_attempt(id, attempt).await;

            let record = InstallRecord::transitional(
                id,
                ComponentStatus::Uninstalling,
                25,
                format!(
                    "Running uninstall action (attempt {}/{})",
                    attempt, self.config.retry_max
                ),
            );
            self.store.upsert(&record).await?;

            if let Err(e) = self.runner.uninstall(component).await {
                tracing::warn!("Uninstall action for '{}' failed (attempt {}): {}", id, attempt, e);
                last_error = Some(e);
                continue;
            }

            let observed = self.await_gone(component).await;

            if observed.is_absent() {
                let record = InstallRecord::terminal(
                    id,
                    ComponentStatus::NotInstalled,
                    format!("{} is not installed", component.display_name),
                    HashMap::new(),
                );
                self.store.upsert(&record).await?;
                return Ok(());
            }

            tracing::warn!(
                "Uninstall verification for '{}' failed (attempt {}): {}",
                id,
                attempt,
                observed.detail
            );
            last_error = Some(AppError::ActionFailed(format!(
                "verification failed: {}",
                observed.detail
            )));
        }

        Err(last_error.unwrap_or_else(|| AppError::ActionFailed("uninstall failed".to_string())))
    }

    async fn execute_restart(&self, component: &Component) -> Result<()> {
        let id = &component.id;
        let previous_urls = self
            .store
            .get(id)
            .await?
            .map(|r| r.access_urls)
            .unwrap_or_default();
        let mut last_error: Option<AppError> = None;

        for attempt in 1..=self.config.retry_max {
            if attempt > 1 {
                tokio::time::sleep(self.config.backoff_for_attempt(attempt - 1)).await;
            }
            self.bump_attempt(id, attempt).await;

            let record = InstallRecord::transitional(
                id,
                ComponentStatus::Restarting,
                25,
                format!("Restarting {}", component.display_name),
            );
            self.store.upsert(&record).await?;

            if let Err(e) = self.runner.restart(component).await {
                tracing::warn!("Restart action for '{}' failed (attempt {}): {}", id, attempt, e);
                last_error = Some(e);
                continue;
            }

            let observed = self
                .await_converged(component, ComponentStatus::Restarting)
                .await;

            if observed.is_present() && observed.healthy {
                let record = InstallRecord::terminal(
                    id,
                    ComponentStatus::Installed,
                    format!("{} restarted", component.display_name),
                    previous_urls,
                );
                self.store.upsert(&record).await?;
                return Ok(());
            }

            last_error = Some(AppError::ActionFailed(format!(
                "verification failed: {}",
                observed.detail
            )));
        }

        Err(last_error.unwrap_or_else(|| AppError::ActionFailed("restart failed".to_string())))
    }

    /// Poll ground truth until the component is present and healthy, or
    /// until the probe reports it absent/unreachable (which the caller
    /// treats as a failed attempt). Health convergence can legitimately take
    /// a while; the operation deadline bounds this loop.
    async fn await_converged(
        &self,
        component: &Component,
        status: ComponentStatus,
    ) -> ObservedState {
        let mut progress: u8 = 60;

        loop {
            let observed = self.prober.probe(component).await;
            match observed.presence {
                Presence::Present if observed.healthy => return observed,
                Presence::Present => {
                    progress = (progress + 5).min(90);
                    let record = InstallRecord::transitional(
                        &component.id,
                        status,
                        progress,
                        format!("Waiting for {}: {}", component.display_name, observed.detail),
                    );
                    if let Err(e) = self.store.upsert(&record).await {
                        tracing::warn!("Progress update for '{}' failed: {}", component.id, e);
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Presence::Absent | Presence::Unknown => return observed,
            }
        }
    }

    /// Poll ground truth until the component is gone. Still-present means the
    /// collaborator is tearing down (namespaces terminate slowly); Unknown is
    /// returned to the caller as a failed attempt.
    async fn await_gone(&self, component: &Component) -> ObservedState {
        let mut progress: u8 = 60;

        loop {
            let observed = self.prober.probe(component).await;
            match observed.presence {
                Presence::Absent => return observed,
                Presence::Present => {
                    progress = (progress + 5).min(90);
                    let record = InstallRecord::transitional(
                        &component.id,
                        ComponentStatus::Uninstalling,
                        progress,
                        format!("Waiting for {} to go away", component.display_name),
                    );
                    if let Err(e) = self.store.upsert(&record).await {
                        tracing::warn!("Progress update for '{}' failed: {}", component.id, e);
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Presence::Unknown => return observed,
            }
        }
    }

    async fn bump_attempt(&self, id: &str, attempt: u32) {
        let mut operations = self.operations.write().await;
        if let Some(op) = operations.get_mut(id) {
            op.attempt = attempt;
        }
    }

    async fn mark_cancelled(&self, id: &str, op_id: Uuid) {
        let mut operations = self.operations.write().await;
        if let Some(op) = operations.get_mut(id) {
            if op.id == op_id {
                op.cancelled = true;
            }
        }
    }

    async fn last_progress(&self, id: &str) -> u8 {
        match self.store.get(id).await {
            Ok(Some(record)) => record.progress,
            _ => 0,
        }
    }
}
