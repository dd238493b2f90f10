pub mod catalog;
pub mod database;
pub mod kubernetes;
pub mod lifecycle;
pub mod server;

use once_cell::sync::Lazy;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: server::ServerConfig,
    pub database: database::DatabaseConfig,
    pub kubernetes: kubernetes::KubernetesConfig,
    pub catalog: catalog::CatalogConfig,
    pub lifecycle: lifecycle::LifecycleConfig,

    pub version: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: server::ServerConfig::from_env(),
            database: database::DatabaseConfig::from_env(),
            kubernetes: kubernetes::KubernetesConfig::from_env(),
            catalog: catalog::CatalogConfig::from_env(),
            lifecycle: lifecycle::LifecycleConfig::from_env(),

            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: env::var("THARNAX_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
