//! Configuration management for the stock ledger
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with LEDGER_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Movement engine tuning
    pub ledger: LedgerConfig,

    /// Log output configuration
    pub logging: LoggingConfig,

    /// Audit sweep configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Attempts per operation when a concurrent writer is detected
    pub max_attempts: u32,

    /// Backoff step between attempts, in milliseconds
    pub retry_backoff_ms: u64,

    /// Bound on the wait for a product's lock, in milliseconds
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuditConfig {
    /// Company to sweep; every company when absent
    pub company_id: Option<Uuid>,
}

/// Runtime settings for the movement engine and stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub lock_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(25),
            lock_timeout: Duration::from_millis(2000),
        }
    }
}

impl LedgerSettings {
    /// Backoff to sleep after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

impl TryFrom<&LedgerConfig> for LedgerSettings {
    type Error = LedgerError;

    fn try_from(cfg: &LedgerConfig) -> LedgerResult<Self> {
        if cfg.max_attempts == 0 {
            return Err(LedgerError::Configuration(
                "ledger.max_attempts must be at least 1".to_string(),
            ));
        }
        if cfg.lock_timeout_ms == 0 {
            return Err(LedgerError::Configuration(
                "ledger.lock_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_attempts: cfg.max_attempts,
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
            lock_timeout: Duration::from_millis(cfg.lock_timeout_ms),
        })
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("ledger.max_attempts", 3)?
            .set_default("ledger.retry_backoff_ms", 25)?
            .set_default("ledger.lock_timeout_ms", 2000)?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER_ prefix)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Engine settings derived from the `ledger` section
    pub fn ledger_settings(&self) -> LedgerResult<LedgerSettings> {
        LedgerSettings::try_from(&self.ledger)
    }
}
