use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::install_record;
use crate::models::prelude::*;

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    NotInstalled,
    Installing,
    Installed,
    Uninstalling,
    Restarting,
    Error,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::NotInstalled => "not_installed",
            ComponentStatus::Installing => "installing",
            ComponentStatus::Installed => "installed",
            ComponentStatus::Uninstalling => "uninstalling",
            ComponentStatus::Restarting => "restarting",
            ComponentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_installed" => Some(ComponentStatus::NotInstalled),
            "installing" => Some(ComponentStatus::Installing),
            "installed" => Some(ComponentStatus::Installed),
            "uninstalling" => Some(ComponentStatus::Uninstalling),
            "restarting" => Some(ComponentStatus::Restarting),
            "error" => Some(ComponentStatus::Error),
            _ => None,
        }
    }

    /// Terminal states carry progress 100; everything else is in flight.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ComponentStatus::Installed | ComponentStatus::NotInstalled
        )
    }

    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ComponentStatus::Installing
                | ComponentStatus::Uninstalling
                | ComponentStatus::Restarting
        )
    }
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted status/progress/message for one component. Outlives any single
/// operation; updated only by the lifecycle engine worker for its component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub component: String,
    pub status: ComponentStatus,
    pub progress: u8,
    pub message: String,
    pub last_transition: DateTime<Utc>,
    #[serde(default)]
    pub access_urls: HashMap<String, String>,
}

impl InstallRecord {
    /// A terminal record: progress is pinned at 100.
    pub fn terminal(
        component: &str,
        status: ComponentStatus,
        message: impl Into<String>,
        access_urls: HashMap<String, String>,
    ) -> Self {
        debug_assert!(status.is_terminal());
        Self {
            component: component.to_string(),
            status,
            progress: 100,
            message: message.into(),
            last_transition: Utc::now(),
            access_urls,
        }
    }

    /// An in-flight record: progress is clamped below 100.
    pub fn transitional(
        component: &str,
        status: ComponentStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Self {
        debug_assert!(status.is_transitional());
        Self {
            component: component.to_string(),
            status,
            progress: progress.min(99),
            message: message.into(),
            last_transition: Utc::now(),
            access_urls: HashMap::new(),
        }
    }

    /// An error record. Keeps the progress the operation reached, clamped
    /// below 100 so polling clients can distinguish it from completion.
    pub fn error(component: &str, progress: u8, message: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            status: ComponentStatus::Error,
            progress: progress.min(99),
            message: message.into(),
            last_transition: Utc::now(),
            access_urls: HashMap::new(),
        }
    }
}

/// Durable component-id -> InstallRecord mapping backed by the database.
/// Readable by any caller; written only through the lifecycle engine.
#[derive(Clone)]
pub struct StateStore {
    db: DatabaseConnection,
}

impl StateStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Fetch the record for a component, if one has been created.
    pub async fn get(&self, component: &str) -> Result<Option<InstallRecord>> {
        let model = InstallRecordEntity::find()
            .filter(install_record::Column::Component.eq(component))
            .one(&self.db)
            .await?;

        Ok(model.map(record_from_model))
    }

    /// Insert or overwrite the whole record for a component.
    pub async fn upsert(&self, record: &InstallRecord) -> Result<()> {
        let urls = serde_json::to_string(&record.access_urls)?;

        let existing = InstallRecordEntity::find()
            .filter(install_record::Column::Component.eq(&record.component))
            .one(&self.db)
            .await?;

        match existing {
            Some(model) => {
                let mut active: install_record::ActiveModel = model.into();
                active.status = Set(record.status.as_str().to_string());
                active.progress = Set(i32::from(record.progress));
                active.message = Set(record.message.clone());
                active.last_transition = Set(record.last_transition);
                active.access_urls = Set(urls);
                active.update(&self.db).await?;
            }
            None => {
                let active = install_record::ActiveModel {
                    component: Set(record.component.clone()),
                    status: Set(record.status.as_str().to_string()),
                    progress: Set(i32::from(record.progress)),
                    message: Set(record.message.clone()),
                    last_transition: Set(record.last_transition),
                    access_urls: Set(urls),
                    ..Default::default()
                };
                active.insert(&self.db).await?;
            }
        }

        Ok(())
    }

    /// All known records. Snapshot consistency is not required here; the
    /// catalog view re-polls on a short interval anyway.
    pub async fn list(&self) -> Result<Vec<InstallRecord>> {
        let models = InstallRecordEntity::find().all(&self.db).await?;
        Ok(models.into_iter().map(record_from_model).collect())
    }
}

fn record_from_model(model: install_record::Model) -> InstallRecord {
    let status = ComponentStatus::parse(&model.status).unwrap_or_else(|| {
        tracing::warn!(
            "Unknown status '{}' stored for component '{}'",
            model.status,
            model.component
        );
        ComponentStatus::Error
    });

    let access_urls: HashMap<String, String> =
        serde_json::from_str(&model.access_urls).unwrap_or_default();

    InstallRecord {
        component: model.component,
        status,
        progress: model.progress.clamp(0, 100) as u8,
        message: model.message,
        last_transition: model.last_transition,
        access_urls,
    }
}
