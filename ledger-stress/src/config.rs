//! Configuration for the stress runner

use crate::error::{Result, StressError};
use ledger_accounting::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger database
    pub database: DatabaseConfig,

    /// Worker pool and workload shape
    pub workload: WorkloadConfig,

    /// Metrics export
    pub telemetry: TelemetryConfig,

    /// Log output
    pub logging: LoggingConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Reader/transactor pairs; one churner is always added
    pub worker_pairs: usize,

    /// Churner pause between iterations (milliseconds)
    pub churn_interval_ms: u64,

    /// Balance of the account created after each successful delete (cents)
    pub replacement_balance_cents: i64,

    /// Accounts guaranteed to exist before workers start
    pub seed_accounts: u64,

    /// Balance of each seeded account (cents)
    pub seed_balance_cents: i64,

    /// Master seed for the worker RNGs; random when unset
    pub rng_seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            worker_pairs: 50,
            churn_interval_ms: 500,
            replacement_balance_cents: 100_000, // 1000.00
            seed_accounts: 100,
            seed_balance_cents: 100_000,
            rng_seed: None,
        }
    }
}

impl WorkloadConfig {
    /// Churner pause between iterations
    pub fn churn_interval(&self) -> Duration {
        Duration::from_millis(self.churn_interval_ms)
    }

    /// Readers + transactors + the churner
    pub fn total_workers(&self) -> usize {
        self.worker_pairs * 2 + 1
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Prefix of the exported counter family
    pub metric_prefix: String,

    /// Address serving `/metrics` and `/health`; disabled when unset
    pub metrics_listen_addr: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metric_prefix: "crdb".to_string(),
            metrics_listen_addr: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML text; an unset pool size follows the worker count
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| StressError::Config(format!("Failed to parse config: {}", e)))?;
        config.size_pool();
        Ok(config)
    }

    /// Pool upper bound: the configured value, else one connection per worker
    pub fn max_connections(&self) -> u32 {
        self.database
            .max_connections
            .unwrap_or(self.workload.total_workers() as u32)
    }

    fn size_pool(&mut self) {
        let size = self.max_connections();
        self.database.max_connections = Some(size);
    }

    /// Load `LEDGER_STRESS_CONFIG` (if set), then apply environment overrides
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match env::var("LEDGER_STRESS_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };
        config.apply_env()?;
        config.size_pool();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(pairs) = parse_var("LEDGER_STRESS_WORKER_PAIRS")? {
            self.workload.worker_pairs = pairs;
        }

        if let Some(max) = parse_var("LEDGER_STRESS_DB_MAX_CONNECTIONS")? {
            self.database.max_connections = Some(max);
        }

        if let Some(seed_accounts) = parse_var("LEDGER_STRESS_SEED_ACCOUNTS")? {
            self.workload.seed_accounts = seed_accounts;
        }

        if let Some(interval) = parse_var("LEDGER_STRESS_CHURN_INTERVAL_MS")? {
            self.workload.churn_interval_ms = interval;
        }

        if let Some(seed) = parse_var("LEDGER_STRESS_RNG_SEED")? {
            self.workload.rng_seed = Some(seed);
        }

        if let Ok(addr) = env::var("LEDGER_STRESS_METRICS_ADDR") {
            self.telemetry.metrics_listen_addr = Some(addr);
        }

        if let Some(json) = parse_var("LEDGER_STRESS_LOG_JSON")? {
            self.logging.json = json;
        }

        Ok(())
    }

    /// Reject configurations the runner cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.workload.worker_pairs == 0 {
            return Err(StressError::Config(
                "worker_pairs must be at least 1".to_string(),
            ));
        }

        let max_connections = self.max_connections();
        if (max_connections as usize) < self.workload.worker_pairs {
            return Err(StressError::Config(format!(
                "max_connections ({}) must cover every transactor ({})",
                max_connections, self.workload.worker_pairs
            )));
        }

        let prefix = &self.telemetry.metric_prefix;
        let valid_prefix = prefix
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_prefix {
            return Err(StressError::Config(format!(
                "Invalid metric prefix '{}'",
                prefix
            )));
        }

        if let Some(addr) = &self.telemetry.metrics_listen_addr {
            addr.parse::<SocketAddr>().map_err(|e| {
                StressError::Config(format!("Invalid metrics address '{}': {}", addr, e))
            })?;
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| StressError::Config(format!("{} is invalid: {}", name, e))),
        Err(_) => Ok(None),
    }
}
