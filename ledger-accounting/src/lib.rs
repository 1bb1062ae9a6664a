//! Ledger Accounting
//!
//! Transactional accounting over a SQL ledger: account creation and deletion,
//! balance reads, random account selection and atomic batch debits.
//!
//! # Invariants
//!
//! - Non-negative balance: a committed batch never leaves an account below zero
//! - All-or-nothing batches: every entry is persisted and the balance debited by
//!   their sum, or nothing is
//! - Single mutation path: balances change only through [`Accounting::process_batch`]

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod engine;
pub mod error;
pub mod store;
pub mod types;

// Re-exports
pub use engine::Accounting;
pub use error::{AccountingError, ErrorKind, Result, StoreError};
pub use store::memory::{MemoryStore, Statement};
pub use store::postgres::{DatabaseConfig, PgLedgerStore};
pub use store::{LedgerStore, UnitOfWork, WriteResult};
pub use types::{AccountId, LedgerEntry, WritePath};
