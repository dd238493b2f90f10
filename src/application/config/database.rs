use std::env;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL for the state store. Defaults to a local sqlite file so
    /// install records survive a process restart.
    pub url: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env::var("THARNAX_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://tharnax.db?mode=rwc".to_string()),
        }
    }
}
