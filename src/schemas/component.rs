use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::services::catalog::{Category, Component};
use crate::services::lifecycle::{IntentAck, IntentStatus};
use crate::services::store::InstallRecord;

/// Catalog entry merged with its install record, as rendered by the
/// dashboard's component cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub category: Category,
    pub protected: bool,
    pub depends_on: Vec<String>,
    pub status: String,
    pub progress: u8,
    pub message: String,
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

impl ComponentSummary {
    pub fn new(component: &Component, record: &InstallRecord) -> Self {
        Self {
            id: component.id.clone(),
            display_name: component.display_name.clone(),
            description: component.description.clone(),
            category: component.category,
            protected: component.protected,
            depends_on: component.depends_on.clone(),
            status: record.status.to_string(),
            progress: record.progress,
            message: record.message.clone(),
            urls: record.access_urls.clone(),
        }
    }
}

/// Outcome field of an intent response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentResult {
    Accepted,
    AlreadyProcessing,
    Rejected,
}

/// Body returned by the install/uninstall/restart endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResponse {
    pub status: IntentResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<InstallRecord>,
}

impl IntentResponse {
    pub fn rejected(reason: String) -> Self {
        Self {
            status: IntentResult::Rejected,
            reason: Some(reason),
            record: None,
        }
    }
}

impl From<IntentAck> for IntentResponse {
    fn from(ack: IntentAck) -> Self {
        let status = match ack.status {
            IntentStatus::Accepted => IntentResult::Accepted,
            IntentStatus::AlreadyProcessing => IntentResult::AlreadyProcessing,
        };
        Self {
            status,
            reason: None,
            record: Some(ack.record),
        }
    }
}
