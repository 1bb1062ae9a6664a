//! Log subscriber setup and the per-run span

use crate::config::LoggingConfig;
use crate::error::{Result, StressError};
use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    installed.map_err(|e| StressError::Logging(e.to_string()))
}

/// Root span of one process run; every worker span is its child
pub fn run_span(run_id: Uuid) -> Span {
    tracing::info_span!("ledger_stress", run_id = %run_id)
}
