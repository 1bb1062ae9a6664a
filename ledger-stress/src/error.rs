//! Error types for the stress runner

use thiserror::Error;

/// Result type for runner setup
pub type Result<T> = std::result::Result<T, StressError>;

/// Errors that stop the runner from starting.
///
/// Per-operation failures never surface here; workers classify them and move on.
#[derive(Error, Debug)]
pub enum StressError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store bootstrap failed (connect, schema)
    #[error("Store error: {0}")]
    Store(#[from] ledger_accounting::StoreError),

    /// Seeding the account population failed
    #[error("Accounting error: {0}")]
    Accounting(#[from] ledger_accounting::AccountingError),

    /// Log subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
