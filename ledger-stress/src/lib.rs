//! Ledger Stress
//!
//! Concurrent workload generator that keeps a transactional ledger under
//! read, debit and churn load, and reports every outcome as a metric.
//!
//! # Architecture
//!
//! - **Workers**: N readers + N transactors + 1 churner, each a self-driving loop
//! - **Controller**: one cancellation token, one task tracker, drain on shutdown
//! - **Classifier**: every outcome becomes exactly one metric and one log line
//! - **Engine**: [`ledger_accounting::Accounting`] shared by every worker

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod server;
pub mod telemetry;
pub mod worker;
pub mod workload;

// Re-exports
pub use classifier::{Classification, Operation, OutcomeClassifier};
pub use config::Config;
pub use controller::LifecycleController;
pub use error::{Result, StressError};
pub use telemetry::{Metrics, TelemetrySink};
pub use worker::WorkerRole;
pub use workload::EntryGenerator;
