//! Ledger store interface
//!
//! Each method maps to exactly one statement against the schema:
//!
//! ```text
//! accounts(id, balance_cents)
//! transactions(id, account, amount_cents, description)
//! ```
//!
//! Consistency between concurrent callers is left entirely to the store's
//! transaction isolation; nothing here takes an in-process lock per account.

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::types::{AccountId, LedgerEntry, WritePath};
use async_trait::async_trait;

/// Result of a write statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    rows_affected: Option<u64>,
}

impl WriteResult {
    /// Write that reported its affected row count
    pub fn with_rows(rows: u64) -> Self {
        Self {
            rows_affected: Some(rows),
        }
    }

    /// Write whose affected row count is unavailable
    pub fn unknown() -> Self {
        Self {
            rows_affected: None,
        }
    }

    /// Rows the statement touched, if the store could tell
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }
}

/// Single-statement access to the ledger plus the entry point for units of work
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// `SELECT balance_cents FROM accounts WHERE id = $1`
    async fn read_balance(&self, account: &AccountId) -> Result<i64, StoreError>;

    /// `INSERT INTO accounts (balance_cents) VALUES ($1) RETURNING id`
    async fn insert_account(&self, balance_cents: i64) -> Result<AccountId, StoreError>;

    /// `DELETE FROM accounts WHERE id = $1`
    async fn delete_account(&self, account: &AccountId) -> Result<WriteResult, StoreError>;

    /// One account chosen by store-side random ordering
    async fn random_account(&self) -> Result<(AccountId, i64), StoreError>;

    /// Number of existing accounts
    async fn count_accounts(&self) -> Result<u64, StoreError>;

    /// Start a unit of work using the given write path
    async fn begin(&self, path: WritePath) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// Statements scoped to one atomic unit of work
#[async_trait]
pub trait UnitOfWork: Send {
    /// Insert one entry owned by `account`
    async fn insert_entry(
        &mut self,
        account: &AccountId,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError>;

    /// `UPDATE accounts SET balance_cents = balance_cents - $1 WHERE id = $2`
    async fn debit_balance(
        &mut self,
        account: &AccountId,
        total_cents: i64,
    ) -> Result<WriteResult, StoreError>;

    /// Balance as seen inside this unit of work
    async fn read_balance(&mut self, account: &AccountId) -> Result<i64, StoreError>;

    /// Make every statement durable
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every statement
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
