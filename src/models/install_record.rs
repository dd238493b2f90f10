use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "install_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub component: String,
    pub status: String, // 'not_installed', 'installing', 'installed', 'uninstalling', 'restarting', 'error'
    pub progress: i32,
    pub message: String,
    pub last_transition: DateTimeUtc,
    /// JSON object mapping endpoint name to URL, e.g. {"grafana": "http://..."}
    pub access_urls: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
