use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    /// The engine runs fully in memory; Postgres is an optional archive
    /// sink for the ledger feed.
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// How long past pickup a PENDING reservation may linger before the
    /// sweeper cancels it.
    pub pending_grace_seconds: i64,
    /// Interval between sweeper passes.
    pub expiry_sweep_seconds: u64,
    pub idempotency_retention_days: i64,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_page_size")]
    pub ledger_page_size: usize,
}

fn default_currency() -> String {
    "COP".to_string()
}

fn default_page_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment
            // Eg. `AVENTON__SERVER__PORT=9000` overrides the port
            .add_source(config::Environment::with_prefix("AVENTON").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
